//! Reply building for the HTTP control API, shared by both runtimes.

use serde_json::{json, Value};

use crate::{
    controller::FanController,
    error::TimerError,
    outputs::SpeedOutputs,
    store::LevelStore,
};

pub const CORS_ALLOW_ORIGIN: &str = "*";
pub const CORS_ALLOW_METHODS: &str = "GET,POST,OPTIONS";
pub const CORS_ALLOW_HEADERS: &str = "Content-Type";

#[derive(Debug, Clone, PartialEq)]
pub struct ApiReply {
    pub status: u16,
    pub body: Value,
}

impl ApiReply {
    fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    pub fn error(status: u16, message: &str) -> Self {
        Self {
            status,
            body: json!({ "result": false, "error": message }),
        }
    }
}

pub fn turn_on<O: SpeedOutputs, S: LevelStore>(controller: &mut FanController<O, S>) -> ApiReply {
    controller.set_power(true);
    ApiReply::ok(json!({ "result": true, "status": 1 }))
}

pub fn turn_off<O: SpeedOutputs, S: LevelStore>(controller: &mut FanController<O, S>) -> ApiReply {
    controller.set_power(false);
    ApiReply::ok(json!({ "result": true, "status": 0 }))
}

pub fn set_level<O: SpeedOutputs, S: LevelStore>(
    controller: &mut FanController<O, S>,
    raw: Option<&str>,
) -> ApiReply {
    let Some(level) = raw.and_then(|value| value.trim().parse::<i32>().ok()) else {
        return ApiReply::error(400, "invalid level");
    };

    match controller.set_state(true, level) {
        Ok(state) => ApiReply::ok(json!({
            "result": true,
            "status": 1,
            "level": state.level.as_i32(),
        })),
        Err(_) => ApiReply::error(400, "invalid level"),
    }
}

/// Rejects the request before touching the running countdown when the
/// duration is missing or not positive.
pub fn arm_timer<O: SpeedOutputs, S: LevelStore>(
    controller: &mut FanController<O, S>,
    raw: Option<&str>,
    now_ms: u64,
) -> ApiReply {
    let seconds = raw
        .and_then(|value| value.trim().parse::<i64>().ok())
        .filter(|seconds| *seconds > 0);
    let Some(seconds) = seconds else {
        return ApiReply::error(400, "invalid timer");
    };

    match controller.arm_off_timer(seconds, now_ms) {
        Ok(armed) => ApiReply::ok(json!({ "result": true, "timer": armed })),
        Err(err) => timer_error_reply(err),
    }
}

pub fn cancel_timer<O: SpeedOutputs, S: LevelStore>(
    controller: &mut FanController<O, S>,
) -> ApiReply {
    match controller.cancel_off_timer() {
        Ok(()) => ApiReply::ok(json!({ "result": true })),
        Err(err) => timer_error_reply(err),
    }
}

pub fn status<O: SpeedOutputs, S: LevelStore>(
    controller: &FanController<O, S>,
    now_ms: u64,
) -> ApiReply {
    let status = controller.status(now_ms);
    ApiReply::ok(json!({
        "status": status.status,
        "timer_left": status.timer_left,
        "level": status.level,
        "timer_armed": status.timer_armed,
    }))
}

fn timer_error_reply(err: TimerError) -> ApiReply {
    match err {
        TimerError::InvalidDuration(_) => ApiReply::error(400, "invalid timer"),
        TimerError::NoActiveTimer => ApiReply::error(409, "no timer running"),
    }
}

/// Extracts `key` from the query part of a URI (or a bare query string).
pub fn query_param(uri: &str, key: &str) -> Option<String> {
    let query = match uri.split_once('?') {
        Some((_, query)) => query,
        None if uri.starts_with('/') => return None,
        None => uri,
    };

    query.split('&').find_map(|pair| {
        let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
        (name == key).then(|| value.to_string())
    })
}
