use std::{
    sync::{Mutex, MutexGuard, PoisonError},
    time::Instant,
};

use log::{error, info, warn};

use crate::{
    blink::BlinkSender,
    config::FanConfig,
    error::{SetStateError, TimerError},
    hook::StateChangeHook,
    outputs::{LedHandle, SpeedOutputs},
    store::{persist_level, read_persisted_level, LevelStore},
    types::{FanLevel, FanState, FanStatus, StateChange},
};

#[derive(Debug, Clone, Copy)]
struct DeferredOff {
    deadline_ms: u64,
}

/// Owns the relay lines, the remembered speed level and the single
/// deferred-off timer. Shared between collaborators behind a `Mutex`.
pub struct FanController<O, S> {
    config: FanConfig,
    outputs: O,
    store: S,
    led: LedHandle,
    blink: BlinkSender,

    on: bool,
    level: FanLevel,
    deferred_off: Option<DeferredOff>,
}

impl<O: SpeedOutputs, S: LevelStore> FanController<O, S> {
    /// Boots with every relay released and the LED dark, recalling the last
    /// persisted level.
    pub fn new(
        config: FanConfig,
        outputs: O,
        store: S,
        led: LedHandle,
        blink: BlinkSender,
    ) -> Self {
        let level = read_persisted_level(&store, config.default_level);
        let mut controller = Self {
            config,
            outputs,
            store,
            led,
            blink,
            on: false,
            level,
            deferred_off: None,
        };
        controller.release_all_lines();
        controller.led.off();
        info!("fan controller ready: level={level}");
        controller
    }

    pub fn state(&self) -> FanState {
        FanState {
            on: self.on,
            level: self.level,
        }
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    pub fn current_level(&self) -> FanLevel {
        self.level
    }

    pub fn led_on(&self) {
        self.led.on();
    }

    pub fn led_off(&self) {
        self.led.off();
    }

    /// Switches power at the remembered level.
    pub fn set_power(&mut self, on: bool) -> FanState {
        self.apply(on, self.level)
    }

    pub fn power_on_at(&mut self, level: FanLevel) -> FanState {
        self.apply(true, level)
    }

    /// Switches power at an explicit level. Out-of-range levels leave the
    /// fan untouched.
    pub fn set_state(&mut self, on: bool, level: i32) -> Result<FanState, SetStateError> {
        let level = FanLevel::try_from(level).inspect_err(|err| error!("{err}"))?;
        Ok(self.apply(on, level))
    }

    /// Arms the single-shot deferred off, replacing any running countdown.
    /// Non-positive durations only clear the current countdown.
    pub fn arm_off_timer(&mut self, seconds: i64, now_ms: u64) -> Result<u64, TimerError> {
        let replaced = self.deferred_off.take();

        if seconds <= 0 {
            if replaced.is_some() {
                info!("deferred off cancelled by {seconds}s arm request");
            }
            return Err(TimerError::InvalidDuration(seconds));
        }

        let seconds = seconds as u64;
        self.deferred_off = Some(DeferredOff {
            deadline_ms: now_ms.saturating_add(seconds.saturating_mul(1_000)),
        });

        if replaced.is_some() {
            info!("deferred off re-armed for {seconds}s");
        } else {
            info!("deferred off armed for {seconds}s");
        }
        Ok(seconds)
    }

    pub fn cancel_off_timer(&mut self) -> Result<(), TimerError> {
        match self.deferred_off.take() {
            Some(_) => {
                info!("deferred off cancelled");
                Ok(())
            }
            None => Err(TimerError::NoActiveTimer),
        }
    }

    pub fn is_off_timer_armed(&self) -> bool {
        self.deferred_off.is_some()
    }

    pub fn off_timer_remaining_secs(&self, now_ms: u64) -> u64 {
        match self.deferred_off {
            Some(timer) => timer.deadline_ms.saturating_sub(now_ms) / 1_000,
            None => 0,
        }
    }

    /// Powers the fan off if the countdown has run out. The returned change
    /// is what observers must be told.
    pub fn expire_off_timer(&mut self, now_ms: u64) -> Option<StateChange> {
        let timer = self.deferred_off?;
        if now_ms < timer.deadline_ms {
            return None;
        }

        self.deferred_off = None;
        info!("deferred off expired; switching fan off");
        self.set_power(false);
        Some(StateChange::timer_off())
    }

    pub fn status(&self, now_ms: u64) -> FanStatus {
        FanStatus {
            status: u8::from(self.on),
            timer_left: self.off_timer_remaining_secs(now_ms),
            level: self.level.as_i32(),
            timer_armed: self.is_off_timer_armed(),
        }
    }

    fn apply(&mut self, on: bool, level: FanLevel) -> FanState {
        let started = Instant::now();
        info!("change fan state: start, on={on}, level={level}");

        // Release first so two speeds are never energised together.
        self.release_all_lines();

        if on {
            self.drive_line(level, true);
            persist_level(&mut self.store, level);
        }
        self.on = on;
        self.level = level;

        self.blink.request(self.config.blink_times);
        info!(
            "change fan state: end, elapsed={}ms",
            started.elapsed().as_millis()
        );
        self.state()
    }

    fn release_all_lines(&mut self) {
        for level in FanLevel::ALL {
            self.drive_line(level, false);
        }
    }

    fn drive_line(&mut self, level: FanLevel, asserted: bool) {
        if let Err(err) = self.outputs.write_line(level, asserted) {
            warn!("relay write failed for level {level}: {err}");
        }
    }
}

/// Locks a shared value, recovering the data if a holder panicked.
pub fn lock_shared<T>(shared: &Mutex<T>) -> MutexGuard<'_, T> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Timer-service entry point: expires the countdown under the lock, then
/// notifies the hook once the lock is released.
pub fn fire_expired_timer<O: SpeedOutputs, S: LevelStore>(
    controller: &Mutex<FanController<O, S>>,
    hook: &dyn StateChangeHook,
    now_ms: u64,
) -> bool {
    let change = lock_shared(controller).expire_off_timer(now_ms);
    match change {
        Some(change) => {
            hook.on_state_change(change);
            true
        }
        None => false,
    }
}
