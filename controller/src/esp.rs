use core::convert::TryInto;
use std::{
    sync::{Arc, Mutex, OnceLock},
    thread,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context};
use embedded_svc::{
    http::{Headers, Method},
    io::{Read, Write},
    wifi::{AccessPointConfiguration, AuthMethod, ClientConfiguration, Configuration},
};
use esp_idf_hal::gpio::{AnyIOPin, Input, Output, PinDriver, Pull};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{gpio::AnyOutputPin, modem::Modem, prelude::Peripherals},
    http::server::{Configuration as HttpConfiguration, EspHttpConnection, EspHttpServer, Request},
    log::EspLogger,
    nvs::{EspDefaultNvsPartition, EspNvs},
    wifi::{BlockingWifi, EspWifi},
};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use fan_common::{
    api::{self, ApiReply, CORS_ALLOW_HEADERS, CORS_ALLOW_METHODS, CORS_ALLOW_ORIGIN},
    blink_channel, fire_expired_timer, lock_shared, run_blink_worker, AccessoryMirror,
    AccessoryWrite, BlinkReceiver, FanController, FanLevel, LedHandle, LevelStore, LongPress, NetworkConfig,
    OutputError, PinConfig, RuntimeConfig, SpeedOutputs, StatusLed, StoreError, LEVEL_KEY,
    LEVEL_NAMESPACE,
};

const NVS_RUNTIME_KEY: &str = "runtime_json";
const MAX_HTTP_BODY: usize = 1024;
const PROVISIONING_AP_SSID: &str = "FanController-AP";
const PROVISIONING_AP_PASSWORD: &str = "FanSetup";
const WIFI_CONNECT_ATTEMPTS: u32 = 5;
const WIFI_RETRY_DELAY_MS: u64 = 3_000;
const BUTTON_POLL_MS: u64 = 50;
const WORKER_STACK_SIZE: usize = 4 * 1024;

const INDEX_HTML: &str = include_str!("../web/index.html");
const APP_JS: &str = include_str!("../web/app.js");
const STYLE_CSS: &str = include_str!("../web/style.css");
const PROVISIONING_INDEX_HTML: &str = r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>Fan Provisioning</title>
  <style>
    body{font-family:Arial,sans-serif;max-width:480px;margin:2rem auto;padding:0 1rem;color:#111}
    .card{border:1px solid #ddd;border-radius:8px;padding:1rem}
    label{display:block;margin:.5rem 0 .2rem}input{width:100%;padding:.5rem;box-sizing:border-box}
    button{padding:.55rem .9rem;margin-top:.8rem}.muted{color:#555}.ok{color:#106010}.err{color:#a00000}
  </style>
</head>
<body>
  <h1>Fan Provisioning</h1>
  <p class="muted">Join the fan to your WiFi network. The device restarts after saving.</p>
  <div class="card">
    <label>WiFi SSID</label><input id="wifiSsid" type="text">
    <label>WiFi Password (leave blank to keep current)</label><input id="wifiPass" type="password">
    <button id="save">Save and Restart</button>
    <div id="status" class="muted"></div>
  </div>
  <script>
    const q=(id)=>document.getElementById(id);
    async function api(path,opt){const r=await fetch(path,opt);let b={};try{b=await r.json();}catch(_){}if(!r.ok)throw new Error(b.error||('Request failed: '+r.status));return b;}
    api('/api/network').then((n)=>{q('wifiSsid').value=n.wifiSsid||'';}).catch(()=>{});
    q('save').addEventListener('click', async ()=>{
      q('status').className='muted'; q('status').textContent='Saving...';
      try{
        const payload={wifiSsid:q('wifiSsid').value.trim(),wifiPass:q('wifiPass').value||undefined};
        await api('/api/network',{method:'PUT',headers:{'content-type':'application/json'},body:JSON.stringify(payload)});
        q('status').className='ok'; q('status').textContent='Saved. Restarting...';
      }catch(err){q('status').className='err'; q('status').textContent=err.message;}
    });
  </script>
</body>
</html>
"#;

type EspController = FanController<RelayBank, NvsStore>;

enum WifiStartup {
    Connected(EspWifi<'static>),
    Provisioning(EspWifi<'static>),
}

#[derive(Clone)]
struct SharedState {
    controller: Arc<Mutex<EspController>>,
    mirror: Arc<AccessoryMirror>,
}

/// One output driver per speed tier.
struct RelayBank {
    pins: PinConfig,
    low: PinDriver<'static, AnyOutputPin, Output>,
    medium: PinDriver<'static, AnyOutputPin, Output>,
    high: PinDriver<'static, AnyOutputPin, Output>,
}

struct GpioLed {
    pin: i32,
    driver: PinDriver<'static, AnyOutputPin, Output>,
}

#[derive(Clone)]
struct NvsStore {
    partition: EspDefaultNvsPartition,
    lock: Arc<Mutex<()>>,
}

#[derive(Debug, Serialize)]
struct NetworkConfigView {
    #[serde(rename = "wifiSsid")]
    wifi_ssid: String,
    #[serde(rename = "wifiPassSet")]
    wifi_pass_set: bool,
    hostname: String,
}

#[derive(Debug, Deserialize)]
struct NetworkConfigUpdate {
    #[serde(rename = "wifiSsid")]
    wifi_ssid: String,
    #[serde(rename = "wifiPass", default)]
    wifi_pass: Option<String>,
}

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let nvs_store = NvsStore {
        partition: nvs_partition.clone(),
        lock: Arc::new(Mutex::new(())),
    };

    let mut runtime = nvs_store.load_runtime_config().unwrap_or_else(|err| {
        warn!("failed to load runtime config from NVS: {err:#}");
        RuntimeConfig::default()
    });
    runtime.sanitize();
    ensure_wifi_defaults(&mut runtime);

    info!(
        "NVS config loaded: ssid=`{}`, hostname=`{}`, http_port={}",
        runtime.network.wifi_ssid, runtime.network.hostname, runtime.network.http_port,
    );

    let Peripherals { modem, .. } = Peripherals::take()?;

    let led = LedHandle::new(GpioLed::new(runtime.pins.led)?);
    let (blink, blinks) = blink_channel(runtime.fan.blink_queue_capacity);
    spawn_blink_worker(
        led.clone(),
        blinks,
        Duration::from_millis(runtime.fan.blink_interval_ms),
    )?;

    let controller = FanController::new(
        runtime.fan.clone(),
        RelayBank::new(&runtime.pins)?,
        nvs_store.clone(),
        led,
        blink,
    );
    let mirror = AccessoryMirror::new(runtime.accessory.clone(), controller.state());
    let state = SharedState {
        controller: Arc::new(Mutex::new(controller)),
        mirror: Arc::new(mirror),
    };

    spawn_factory_reset_monitor(&runtime.pins)?;

    // LED stays solid until the station link is up.
    lock_shared(&state.controller).led_on();

    let wifi = match connect_wifi(modem, sys_loop, nvs_partition, &runtime.network)
        .context("wifi startup failed")?
    {
        WifiStartup::Connected(wifi) => {
            info!("wifi connected");
            wifi
        }
        WifiStartup::Provisioning(wifi) => {
            warn!(
                "wifi station connection unavailable; starting provisioning AP `{}`",
                PROVISIONING_AP_SSID
            );
            let server = create_provisioning_http_server(nvs_store)?;

            let _wifi = wifi;
            let _server = server;
            loop {
                thread::sleep(Duration::from_secs(60));
            }
        }
    };
    lock_shared(&state.controller).led_off();

    spawn_timer_service(
        state.clone(),
        Duration::from_millis(runtime.fan.timer_poll_interval_ms),
    )?;

    let server = create_http_server(state, runtime.network.http_port)?;
    info!(
        "accessory `{}` ready (setup code {}, setup id {})",
        runtime.accessory.name, runtime.accessory.setup_code, runtime.accessory.setup_id
    );

    // Keep services alive for the program lifetime.
    let _wifi = wifi;
    let _server = server;

    loop {
        thread::sleep(Duration::from_secs(60));
    }
}

fn ensure_wifi_defaults(runtime: &mut RuntimeConfig) {
    if runtime.network.wifi_ssid.is_empty() {
        if let Some(ssid) = option_env!("WIFI_SSID") {
            runtime.network.wifi_ssid = ssid.to_string();
        }
    }

    if runtime.network.wifi_pass.is_empty() {
        if let Some(pass) = option_env!("WIFI_PASS") {
            runtime.network.wifi_pass = pass.to_string();
        }
    }
}

impl RelayBank {
    fn new(pins: &PinConfig) -> anyhow::Result<Self> {
        let mut bank = Self {
            pins: pins.clone(),
            low: output_pin(pins.low)?,
            medium: output_pin(pins.medium)?,
            high: output_pin(pins.high)?,
        };
        for level in FanLevel::ALL {
            bank.write_line(level, false)?;
        }
        Ok(bank)
    }
}

impl SpeedOutputs for RelayBank {
    fn write_line(&mut self, level: FanLevel, asserted: bool) -> Result<(), OutputError> {
        let pin = self.pins.relay_pin(level);
        let driver = match level {
            FanLevel::Low => &mut self.low,
            FanLevel::Medium => &mut self.medium,
            FanLevel::High => &mut self.high,
        };
        let result = if asserted {
            driver.set_high()
        } else {
            driver.set_low()
        };
        result.map_err(|err| OutputError::Write {
            pin,
            reason: err.to_string(),
        })
    }
}

impl GpioLed {
    fn new(pin: i32) -> anyhow::Result<Self> {
        let mut driver = output_pin(pin)?;
        driver
            .set_low()
            .with_context(|| format!("failed to clear status LED on GPIO{pin}"))?;
        Ok(Self { pin, driver })
    }
}

impl StatusLed for GpioLed {
    fn set_lit(&mut self, lit: bool) -> Result<(), OutputError> {
        let result = if lit {
            self.driver.set_high()
        } else {
            self.driver.set_low()
        };
        result.map_err(|err| OutputError::Write {
            pin: self.pin,
            reason: err.to_string(),
        })
    }
}

fn output_pin(pin: i32) -> anyhow::Result<PinDriver<'static, AnyOutputPin, Output>> {
    let driver = unsafe { PinDriver::output(AnyOutputPin::new(pin)) };
    driver.with_context(|| format!("failed to configure GPIO{pin} as output"))
}

fn input_pin(pin: i32) -> anyhow::Result<PinDriver<'static, AnyIOPin, Input>> {
    let mut driver = unsafe { PinDriver::input(AnyIOPin::new(pin)) }
        .with_context(|| format!("failed to configure GPIO{pin} as input"))?;
    driver
        .set_pull(Pull::Up)
        .with_context(|| format!("failed to enable pull-up on GPIO{pin}"))?;
    Ok(driver)
}

fn spawn_blink_worker(
    led: LedHandle,
    blinks: BlinkReceiver,
    interval: Duration,
) -> anyhow::Result<()> {
    thread::Builder::new()
        .name("blink".into())
        .stack_size(WORKER_STACK_SIZE)
        .spawn(move || run_blink_worker(led, blinks, interval))
        .context("failed to spawn blink thread")?;
    Ok(())
}

fn spawn_timer_service(state: SharedState, poll: Duration) -> anyhow::Result<()> {
    thread::Builder::new()
        .name("fan-timer".into())
        .stack_size(WORKER_STACK_SIZE)
        .spawn(move || loop {
            thread::sleep(poll);
            fire_expired_timer(&*state.controller, &*state.mirror, monotonic_ms());
        })
        .context("failed to spawn timer service thread")?;
    Ok(())
}

fn spawn_factory_reset_monitor(pins: &PinConfig) -> anyhow::Result<()> {
    let button = input_pin(pins.button)?;
    let hold_ms = pins.factory_reset_hold_ms;
    let button_pin = pins.button;

    thread::Builder::new()
        .name("reset-button".into())
        .stack_size(WORKER_STACK_SIZE)
        .spawn(move || {
            let mut long_press = LongPress::new(hold_ms);
            loop {
                // Active low: the boot button pulls the line to ground.
                if long_press.update(button.is_low(), monotonic_ms()) {
                    warn!("GPIO{button_pin} held for {hold_ms}ms; erasing NVS and restarting");
                    factory_reset();
                }
                thread::sleep(Duration::from_millis(BUTTON_POLL_MS));
            }
        })
        .context("failed to spawn reset button thread")?;
    Ok(())
}

fn factory_reset() {
    let rc = unsafe { esp_idf_svc::sys::nvs_flash_erase() };
    if rc != esp_idf_svc::sys::ESP_OK {
        warn!("nvs_flash_erase failed: esp_err_t={rc}");
    }
    thread::sleep(Duration::from_millis(100));
    unsafe { esp_idf_svc::sys::esp_restart() };
}

fn create_http_server(state: SharedState, port: u16) -> anyhow::Result<EspHttpServer<'static>> {
    let conf = HttpConfiguration {
        http_port: port,
        uri_match_wildcard: true,
        stack_size: 10 * 1024,
        ..Default::default()
    };

    let mut server = EspHttpServer::new(&conf)?;

    for (path, content_type, body) in [
        ("/", "text/html", INDEX_HTML),
        ("/index.html", "text/html", INDEX_HTML),
        ("/app.js", "application/javascript", APP_JS),
        ("/style.css", "text/css", STYLE_CSS),
    ] {
        server.fn_handler::<anyhow::Error, _>(path, Method::Get, move |req| {
            req.into_response(200, None, &[("Content-Type", content_type)])?
                .write_all(body.as_bytes())?;
            Ok(())
        })?;
    }

    server.fn_handler::<anyhow::Error, _>("/api/*", Method::Options, move |req| {
        req.into_response(
            204,
            None,
            &[
                ("Access-Control-Allow-Origin", CORS_ALLOW_ORIGIN),
                ("Access-Control-Allow-Methods", CORS_ALLOW_METHODS),
                ("Access-Control-Allow-Headers", CORS_ALLOW_HEADERS),
            ],
        )?;
        Ok(())
    })?;

    {
        let state = state.clone();
        server.fn_handler("/api/on", Method::Get, move |req| {
            let reply = {
                let mut controller = lock_shared(&state.controller);
                let reply = api::turn_on(&mut controller);
                state.mirror.sync(controller.state().into());
                reply
            };
            write_reply(req, reply)
        })?;
    }

    {
        let state = state.clone();
        server.fn_handler("/api/off", Method::Get, move |req| {
            let reply = {
                let mut controller = lock_shared(&state.controller);
                let reply = api::turn_off(&mut controller);
                state.mirror.sync(controller.state().into());
                reply
            };
            write_reply(req, reply)
        })?;
    }

    {
        let state = state.clone();
        server.fn_handler("/api/level", Method::Get, move |req| {
            let value = api::query_param(req.uri(), "value");
            let reply = {
                let mut controller = lock_shared(&state.controller);
                let reply = api::set_level(&mut controller, value.as_deref());
                if reply.status == 200 {
                    state.mirror.sync(controller.state().into());
                }
                reply
            };
            write_reply(req, reply)
        })?;
    }

    {
        let state = state.clone();
        server.fn_handler("/api/timer_off", Method::Get, move |req| {
            let seconds = api::query_param(req.uri(), "seconds");
            let reply = api::arm_timer(
                &mut lock_shared(&state.controller),
                seconds.as_deref(),
                monotonic_ms(),
            );
            write_reply(req, reply)
        })?;
    }

    {
        let state = state.clone();
        server.fn_handler("/api/cancel_timer", Method::Get, move |req| {
            let reply = api::cancel_timer(&mut lock_shared(&state.controller));
            write_reply(req, reply)
        })?;
    }

    {
        let state = state.clone();
        server.fn_handler("/api/status", Method::Get, move |req| {
            let reply = api::status(&lock_shared(&state.controller), monotonic_ms());
            write_reply(req, reply)
        })?;
    }

    {
        let state = state.clone();
        server.fn_handler("/api/accessory", Method::Get, move |req| {
            write_json(req, &state.mirror.snapshot())
        })?;
    }

    {
        let state = state.clone();
        server.fn_handler::<anyhow::Error, _>("/api/accessory", Method::Post, move |mut req| {
            let body = read_request_body(&mut req)?;
            let Ok(write) = serde_json::from_slice::<AccessoryWrite>(&body) else {
                return write_reply(req, ApiReply::error(400, "invalid accessory write"));
            };
            state.mirror.apply_write(&*state.controller, write);
            write_json(req, &state.mirror.snapshot())
        })?;
    }

    Ok(server)
}

fn create_provisioning_http_server(nvs_store: NvsStore) -> anyhow::Result<EspHttpServer<'static>> {
    let conf = HttpConfiguration {
        stack_size: 10 * 1024,
        ..Default::default()
    };
    let mut server = EspHttpServer::new(&conf)?;

    for path in [
        "/",
        "/generate_204",
        "/gen_204",
        "/hotspot-detect.html",
        "/connecttest.txt",
        "/ncsi.txt",
    ] {
        server.fn_handler::<anyhow::Error, _>(path, Method::Get, move |req| {
            req.into_ok_response()?
                .write_all(PROVISIONING_INDEX_HTML.as_bytes())?;
            Ok(())
        })?;
    }

    {
        let nvs_store = nvs_store.clone();
        server.fn_handler("/api/network", Method::Get, move |req| {
            let runtime = nvs_store.load_runtime_config().unwrap_or_default();
            write_json(req, &build_network_config_view(&runtime.network))
        })?;
    }

    {
        let nvs_store = nvs_store.clone();
        server.fn_handler::<anyhow::Error, _>("/api/network", Method::Put, move |mut req| {
            let body = read_request_body(&mut req)?;
            let update: NetworkConfigUpdate =
                serde_json::from_slice(&body).context("invalid network payload")?;

            if let Err(message) = validate_network_update(&update) {
                return write_reply(req, ApiReply::error(400, message));
            }

            let mut runtime = nvs_store.load_runtime_config().unwrap_or_default();
            runtime.network.wifi_ssid = update.wifi_ssid.trim().to_string();
            if let Some(pass) = update.wifi_pass {
                runtime.network.wifi_pass = pass;
            }
            nvs_store.save_runtime_config(&runtime)?;
            info!("wifi credentials stored for `{}`", runtime.network.wifi_ssid);

            schedule_restart(Duration::from_secs(3))?;
            write_json(req, &build_network_config_view(&runtime.network))
        })?;
    }

    Ok(server)
}

fn schedule_restart(delay: Duration) -> anyhow::Result<()> {
    thread::Builder::new()
        .name("restart-request".into())
        .spawn(move || {
            thread::sleep(delay);
            unsafe { esp_idf_svc::sys::esp_restart() };
        })
        .context("failed to spawn restart thread")?;
    Ok(())
}

fn read_request_body(req: &mut Request<&mut EspHttpConnection<'_>>) -> anyhow::Result<Vec<u8>> {
    let len = req.content_len().unwrap_or(0) as usize;
    if len > MAX_HTTP_BODY {
        return Err(anyhow!("request body too large"));
    }

    let mut body = vec![0_u8; len];
    if len > 0 {
        req.read_exact(&mut body)?;
    }
    Ok(body)
}

fn write_reply(req: Request<&mut EspHttpConnection<'_>>, reply: ApiReply) -> anyhow::Result<()> {
    let body = serde_json::to_vec(&reply.body)?;
    req.into_response(
        reply.status,
        None,
        &[
            ("Content-Type", "application/json; charset=utf-8"),
            ("Access-Control-Allow-Origin", CORS_ALLOW_ORIGIN),
        ],
    )?
    .write_all(&body)?;
    Ok(())
}

fn write_json<T: Serialize>(
    req: Request<&mut EspHttpConnection<'_>>,
    payload: &T,
) -> anyhow::Result<()> {
    write_reply(
        req,
        ApiReply {
            status: 200,
            body: serde_json::to_value(payload)?,
        },
    )
}

fn build_network_config_view(network: &NetworkConfig) -> NetworkConfigView {
    NetworkConfigView {
        wifi_ssid: network.wifi_ssid.clone(),
        wifi_pass_set: !network.wifi_pass.is_empty(),
        hostname: network.hostname.clone(),
    }
}

fn validate_network_update(update: &NetworkConfigUpdate) -> Result<(), &'static str> {
    let ssid = update.wifi_ssid.trim();
    if ssid.is_empty() || ssid.len() > 32 {
        return Err("wifiSsid must be 1-32 bytes");
    }
    if let Some(pass) = update.wifi_pass.as_deref() {
        if pass.len() > 64 || (!pass.is_empty() && pass.len() < 8) {
            return Err("wifiPass must be empty or 8-64 bytes");
        }
    }
    Ok(())
}

fn has_station_credentials(network: &NetworkConfig) -> bool {
    !network.wifi_ssid.trim().is_empty()
}

fn connect_wifi(
    modem: Modem,
    sys_loop: EspSystemEventLoop,
    nvs_partition: EspDefaultNvsPartition,
    network: &NetworkConfig,
) -> anyhow::Result<WifiStartup> {
    let mut esp_wifi = EspWifi::new(modem, sys_loop.clone(), Some(nvs_partition))?;
    if let Err(err) = esp_wifi.sta_netif_mut().set_hostname(&network.hostname) {
        warn!("failed to set hostname `{}`: {err}", network.hostname);
    }

    let mut wifi = BlockingWifi::wrap(&mut esp_wifi, sys_loop)?;

    if !has_station_credentials(network) {
        warn!("wifi credentials missing; entering provisioning AP mode");
        start_provisioning_ap(&mut wifi)?;
        return Ok(WifiStartup::Provisioning(esp_wifi));
    }

    let auth_method = if network.wifi_pass.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPAWPA2Personal
    };

    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: network
            .wifi_ssid
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi ssid too long"))?,
        password: network
            .wifi_pass
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi password too long"))?,
        auth_method,
        ..Default::default()
    }))?;

    wifi.start()?;
    info!("wifi started, connecting to `{}`", network.wifi_ssid);

    let mut last_err = None;
    for attempt in 1..=WIFI_CONNECT_ATTEMPTS {
        info!("wifi connect attempt {attempt}/{WIFI_CONNECT_ATTEMPTS}");
        match wifi.connect().and_then(|()| wifi.wait_netif_up()) {
            Ok(()) => {
                info!("wifi connected and netif up on attempt {attempt}");
                last_err = None;
                break;
            }
            Err(err) => {
                warn!("wifi connect failed on attempt {attempt}: {err:#}");
                last_err = Some(err);
            }
        }

        if attempt < WIFI_CONNECT_ATTEMPTS {
            let _ = wifi.disconnect();
            thread::sleep(Duration::from_millis(WIFI_RETRY_DELAY_MS));
        }
    }

    match last_err {
        None => Ok(WifiStartup::Connected(esp_wifi)),
        Some(err) => {
            warn!("all {WIFI_CONNECT_ATTEMPTS} wifi connect attempts failed; last error: {err:#}");
            let _ = wifi.disconnect();
            let _ = wifi.stop();
            start_provisioning_ap(&mut wifi)?;
            Ok(WifiStartup::Provisioning(esp_wifi))
        }
    }
}

fn start_provisioning_ap(wifi: &mut BlockingWifi<&mut EspWifi<'static>>) -> anyhow::Result<()> {
    wifi.set_configuration(&Configuration::AccessPoint(AccessPointConfiguration {
        ssid: PROVISIONING_AP_SSID
            .try_into()
            .map_err(|_| anyhow!("provisioning AP SSID too long"))?,
        password: PROVISIONING_AP_PASSWORD
            .try_into()
            .map_err(|_| anyhow!("provisioning AP password too long"))?,
        auth_method: AuthMethod::WPA2Personal,
        channel: 1,
        ..Default::default()
    }))?;
    wifi.start()?;
    wifi.wait_netif_up()?;
    info!(
        "provisioning AP started on `{}` (password: `{}`)",
        PROVISIONING_AP_SSID, PROVISIONING_AP_PASSWORD
    );
    Ok(())
}

impl NvsStore {
    fn open(&self) -> Result<EspNvs<esp_idf_svc::nvs::NvsDefault>, esp_idf_svc::sys::EspError> {
        EspNvs::new(self.partition.clone(), LEVEL_NAMESPACE, true)
    }

    fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        let _guard = lock_shared(&self.lock);
        let nvs = self.open()?;
        let mut buffer = vec![0_u8; 2048];

        match nvs.get_str(NVS_RUNTIME_KEY, &mut buffer)? {
            Some(value) => Ok(serde_json::from_str::<RuntimeConfig>(value)?),
            None => Ok(RuntimeConfig::default()),
        }
    }

    fn save_runtime_config(&self, runtime: &RuntimeConfig) -> anyhow::Result<()> {
        let _guard = lock_shared(&self.lock);
        let mut nvs = self.open()?;
        let payload = serde_json::to_string(runtime)?;
        nvs.set_str(NVS_RUNTIME_KEY, &payload)?;
        Ok(())
    }
}

impl LevelStore for NvsStore {
    fn load_level(&self) -> Result<Option<i32>, StoreError> {
        let _guard = lock_shared(&self.lock);
        let nvs = self
            .open()
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        nvs.get_i32(LEVEL_KEY)
            .map_err(|err| StoreError::Backend(err.to_string()))
    }

    fn save_level(&mut self, level: i32) -> Result<(), StoreError> {
        let _guard = lock_shared(&self.lock);
        let mut nvs = self
            .open()
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        nvs.set_i32(LEVEL_KEY, level)
            .map_err(|err| StoreError::Backend(err.to_string()))
    }
}

fn monotonic_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}
