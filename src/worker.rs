//! Worker supervisor: spawns the native media worker subprocess, wires the control and payload
//! channels over inherited socket pairs, observes liveness and owns routers.

pub(crate) mod channel;
mod common;
pub(crate) mod payload_channel;
mod utils;

pub use crate::worker::channel::RequestError;
pub(crate) use crate::worker::channel::Channel;
pub use crate::worker::common::SubscriptionTarget;
pub(crate) use crate::worker::common::SubscriptionHandler;
pub use crate::worker::payload_channel::NotificationError;
pub(crate) use crate::worker::payload_channel::{NotificationMessage, PayloadChannel};

use crate::data_structures::AppData;
use crate::event_handlers::{Bag, BagOnce, HandlerId};
use crate::messages::{
    RouterInternal, WorkerCreateRouterRequest, WorkerDumpRequest, WorkerGetResourceUsageRequest,
    WorkerUpdateSettingsRequest,
};
use crate::ortc::RtpCapabilitiesError;
use crate::router::{Router, RouterId, RouterOptions};
use crate::uuid_based_wrapper_type;
use crate::{ortc, worker_manager::WorkerManager};
use async_executor::Executor;
use async_process::{Command, Stdio};
use futures_lite::io::BufReader;
use futures_lite::{AsyncBufReadExt, StreamExt};
use hash_hasher::HashedMap;
use log::{debug, error, warn};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::env;
use std::fmt;
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use thiserror::Error;

uuid_based_wrapper_type!(
    /// [`Worker`] identifier.
    WorkerId
);

/// Logging level for logs generated by the media worker subprocess.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerLogLevel {
    Debug,
    Warn,
    Error,
    None,
}

impl Default for WorkerLogLevel {
    fn default() -> Self {
        Self::Error
    }
}

impl WorkerLogLevel {
    fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::None => "none",
        }
    }
}

/// Log tags for debugging, checked against the worker's documentation.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerLogTag {
    Info,
    Ice,
    Dtls,
    Rtp,
    Srtp,
    Rtcp,
    Rtx,
    Bwe,
    Score,
    Simulcast,
    Svc,
    Sctp,
    Message,
}

impl WorkerLogTag {
    fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Ice => "ice",
            Self::Dtls => "dtls",
            Self::Rtp => "rtp",
            Self::Srtp => "srtp",
            Self::Rtcp => "rtcp",
            Self::Rtx => "rtx",
            Self::Bwe => "bwe",
            Self::Score => "score",
            Self::Simulcast => "simulcast",
            Self::Svc => "svc",
            Self::Sctp => "sctp",
            Self::Message => "message",
        }
    }
}

/// DTLS certificate and private key in PEM format. If unset, a certificate is generated
/// dynamically by the worker.
#[derive(Debug, Clone)]
pub struct WorkerDtlsFiles {
    /// Path to the DTLS public certificate file.
    pub certificate: PathBuf,
    /// Path to the DTLS certificate private key file.
    pub private_key: PathBuf,
}

/// Settings for the worker to be created with.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct WorkerSettings {
    /// Path to the worker binary. When unset, the `MEDIASOUP_WORKER_BIN` environment variable is
    /// honored, then the platform default location (with `MEDIASOUP_BUILDTYPE` selecting the
    /// `Debug` or `Release` build).
    pub worker_binary: Option<PathBuf>,
    /// Logging level for logs generated by the media worker subprocess. Default `error`.
    pub log_level: WorkerLogLevel,
    /// Log tags for debugging.
    pub log_tags: Vec<WorkerLogTag>,
    /// Minimum RTC port for ICE, DTLS, RTP, etc. Default 10000.
    pub rtc_min_port: u16,
    /// Maximum RTC port for ICE, DTLS, RTP, etc. Default 59999.
    pub rtc_max_port: u16,
    /// DTLS certificate and private key. If unset, a certificate is generated dynamically.
    pub dtls_files: Option<WorkerDtlsFiles>,
    /// Custom application data.
    pub app_data: AppData,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            worker_binary: None,
            log_level: WorkerLogLevel::default(),
            log_tags: vec![],
            rtc_min_port: 10000,
            rtc_max_port: 59999,
            dtls_files: None,
            app_data: AppData::default(),
        }
    }
}

impl WorkerSettings {
    fn to_args(&self) -> Vec<String> {
        let mut args = vec![format!("--logLevel={}", self.log_level.as_str())];

        for log_tag in &self.log_tags {
            args.push(format!("--logTags={}", log_tag.as_str()));
        }

        args.push(format!("--rtcMinPort={}", self.rtc_min_port));
        args.push(format!("--rtcMaxPort={}", self.rtc_max_port));

        if let Some(dtls_files) = &self.dtls_files {
            args.push(format!(
                "--dtlsCertificateFile={}",
                dtls_files.certificate.display()
            ));
            args.push(format!(
                "--dtlsPrivateKeyFile={}",
                dtls_files.private_key.display()
            ));
        }

        args
    }
}

/// Settings that can be changed on a running worker.
#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerUpdateSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<WorkerLogLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_tags: Option<Vec<WorkerLogTag>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[doc(hidden)]
#[non_exhaustive]
pub struct WorkerDump {
    pub pid: u32,
    pub router_ids: Vec<RouterId>,
}

/// Resource usage of the worker subprocess, mirroring `uv_rusage_t`.
#[derive(Debug, Default, Copy, Clone, Deserialize, Serialize)]
#[non_exhaustive]
#[allow(missing_docs)]
pub struct WorkerResourceUsage {
    /// User CPU time used (in ms).
    pub ru_utime: u64,
    /// System CPU time used (in ms).
    pub ru_stime: u64,
    /// Maximum resident set size.
    pub ru_maxrss: u64,
    /// Integral shared memory size.
    pub ru_ixrss: u64,
    /// Integral unshared data size.
    pub ru_idrss: u64,
    /// Integral unshared stack size.
    pub ru_isrss: u64,
    /// Page reclaims (soft page faults).
    pub ru_minflt: u64,
    /// Page faults (hard page faults).
    pub ru_majflt: u64,
    /// Swaps.
    pub ru_nswap: u64,
    /// Block input operations.
    pub ru_inblock: u64,
    /// Block output operations.
    pub ru_oublock: u64,
    /// IPC messages sent.
    pub ru_msgsnd: u64,
    /// IPC messages received.
    pub ru_msgrcv: u64,
    /// Signals received.
    pub ru_nsignals: u64,
    /// Voluntary context switches.
    pub ru_nvcsw: u64,
    /// Involuntary context switches.
    pub ru_nivcsw: u64,
}

/// The reason the worker subprocess is gone.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct WorkerExit {
    /// Worker process PID.
    pub pid: u32,
    /// Exit code, when the process exited on its own.
    pub code: Option<i32>,
    /// Name of the signal that terminated the process, when killed by a signal.
    pub signal: Option<String>,
}

impl fmt::Display for WorkerExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[pid:{}, code:{}, signal:{}]",
            self.pid,
            self.code.map_or_else(|| "-".to_string(), |code| code.to_string()),
            self.signal.as_deref().unwrap_or("-"),
        )
    }
}

fn signal_name(signal: i32) -> String {
    match signal {
        1 => "hangup".to_string(),
        2 => "interrupt".to_string(),
        6 => "aborted".to_string(),
        9 => "killed".to_string(),
        11 => "segmentation violation".to_string(),
        15 => "terminated".to_string(),
        signal => format!("signal {signal}"),
    }
}

/// Error that creating a worker can produce.
#[derive(Debug, Error)]
pub enum CreateWorkerError {
    /// The worker rejected its command line arguments (exit code 42).
    #[error("wrong settings")]
    WrongSettings,
    /// The worker exited before reporting itself as running.
    #[error("worker process failed unexpectedly {0}")]
    UnexpectedFailure(WorkerExit),
    /// Spawning the worker subprocess failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Error that creating a router can produce.
#[derive(Debug, Error)]
pub enum CreateRouterError {
    /// RTP capabilities of the router could not be generated from the given media codecs.
    #[error("failed to generate router RTP capabilities: {0}")]
    FailedRtpCapabilitiesGeneration(RtpCapabilitiesError),
    /// Request to the worker failed.
    #[error("request to worker failed: {0}")]
    Request(RequestError),
}

fn resolve_worker_binary(explicit: Option<PathBuf>) -> PathBuf {
    if let Some(path) = explicit {
        return path;
    }
    if let Some(path) = env::var_os("MEDIASOUP_WORKER_BIN") {
        return PathBuf::from(path);
    }

    let build_type = match env::var("MEDIASOUP_BUILDTYPE") {
        Ok(build_type) if build_type == "Debug" => "Debug",
        _ => "Release",
    };

    PathBuf::from("/usr/local/lib/node_modules/mediasoup/worker/out")
        .join(build_type)
        .join("mediasoup-worker")
}

#[derive(Default)]
struct Handlers {
    new_router: Bag<dyn Fn(&Router) + Send + Sync>,
    died: BagOnce<dyn FnOnce(&WorkerExit) + Send>,
    close: BagOnce<dyn FnOnce() + Send>,
}

struct Inner {
    id: WorkerId,
    pid: u32,
    executor: Arc<Executor<'static>>,
    channel: Channel,
    payload_channel: PayloadChannel,
    handlers: Handlers,
    app_data: AppData,
    closed: AtomicBool,
    died: AtomicBool,
    routers: Mutex<HashedMap<RouterId, crate::router::WeakRouter>>,
    // Keeps the executor thread alive for as long as any worker exists.
    _worker_manager: WorkerManager,
}

impl Drop for Inner {
    fn drop(&mut self) {
        debug!("drop()");

        self.close();
    }
}

impl Inner {
    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("close()");

            if !self.died.load(Ordering::SeqCst) {
                if let Err(error) = kill(Pid::from_raw(self.pid as i32), Signal::SIGTERM) {
                    warn!("failed to send SIGTERM to worker [pid:{}]: {}", self.pid, error);
                }
            }

            self.channel.close();
            self.payload_channel.close();

            let routers = std::mem::take(&mut *self.routers.lock());
            for (_, router) in routers {
                if let Some(router) = router.upgrade() {
                    router.worker_closed();
                }
            }

            self.handlers.close.call_simple();
        }
    }

    fn handle_worker_exit(&self, exit: &WorkerExit) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }

        self.died.store(true, Ordering::SeqCst);
        error!("worker process died unexpectedly {}", exit);

        self.handlers.died.call(|callback| callback(exit));
        self.close();
    }
}

/// A worker represents a media worker subprocess that runs on a single CPU core and handles
/// routers.
#[derive(Clone)]
#[must_use = "Worker will be closed on drop, make sure to keep it around for as long as needed"]
pub struct Worker {
    inner: Arc<Inner>,
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.inner.id)
            .field("pid", &self.inner.pid)
            .field("closed", &self.inner.closed)
            .field("died", &self.inner.died)
            .finish()
    }
}

impl Worker {
    pub(crate) async fn new(
        executor: Arc<Executor<'static>>,
        settings: WorkerSettings,
        worker_manager: WorkerManager,
    ) -> Result<Self, CreateWorkerError> {
        debug!("new()");

        let mut settings = settings;
        let worker_binary = resolve_worker_binary(settings.worker_binary.take());
        let app_data = std::mem::replace(&mut settings.app_data, AppData::default());
        let args = settings.to_args();

        debug!(
            "spawning worker process: {} {}",
            worker_binary.display(),
            args.join(" ")
        );

        let mut command = Command::new(&worker_binary);
        command
            .args(args)
            .env_clear()
            .env("MEDIASOUP_VERSION", env!("CARGO_PKG_VERSION"))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let utils::SpawnResult {
            mut child,
            channel,
            payload_channel,
        } = utils::spawn_with_worker_channels(&executor, &mut command)?;

        let pid = child.id();

        {
            let stdout = child.stdout.take().expect("stdout was piped");
            executor
                .spawn(async move {
                    let mut lines = BufReader::new(stdout).lines();
                    while let Some(Ok(line)) = lines.next().await {
                        debug!("[pid:{}] (stdout) {}", pid, line);
                    }
                })
                .detach();
        }
        {
            let stderr = child.stderr.take().expect("stderr was piped");
            executor
                .spawn(async move {
                    let mut lines = BufReader::new(stderr).lines();
                    while let Some(Ok(line)) = lines.next().await {
                        error!("[pid:{}] (stderr) {}", pid, line);
                    }
                })
                .detach();
        }

        let (spawn_result_sender, spawn_result_receiver) =
            async_channel::bounded::<Result<(), CreateWorkerError>>(1);

        // Resolved once the worker reports itself as running.
        let running_subscription = channel.subscribe_to_notifications(pid.into(), {
            let spawn_result_sender = spawn_result_sender.clone();

            move |message: &Value| {
                if message.get("event").and_then(Value::as_str) == Some("running") {
                    debug!("worker process running [pid:{}]", pid);
                    let _ = spawn_result_sender.try_send(Ok(()));
                }
            }
        });

        let inner_weak = Arc::<Mutex<Option<Weak<Inner>>>>::default();

        // Waiter task: observes the subprocess for its whole lifetime.
        executor
            .spawn({
                let inner_weak = Arc::clone(&inner_weak);

                async move {
                    let status = child.status().await;

                    let exit = match status {
                        Ok(exit_status) => WorkerExit {
                            pid,
                            code: exit_status.code(),
                            signal: exit_status.signal().map(signal_name),
                        },
                        Err(error) => {
                            error!("failed to wait for worker [pid:{}]: {}", pid, error);
                            WorkerExit {
                                pid,
                                code: None,
                                signal: None,
                            }
                        }
                    };

                    // Before the worker reported itself as running this resolves the spawn;
                    // afterwards the channel is closed and this send is a no-op.
                    let failure = if exit.code == Some(42) {
                        CreateWorkerError::WrongSettings
                    } else {
                        CreateWorkerError::UnexpectedFailure(exit.clone())
                    };
                    let _ = spawn_result_sender.try_send(Err(failure));

                    let maybe_inner = inner_weak.lock().as_ref().and_then(Weak::upgrade);
                    if let Some(inner) = maybe_inner {
                        inner.handle_worker_exit(&exit);
                    }
                }
            })
            .detach();

        match spawn_result_receiver.recv().await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                channel.close();
                payload_channel.close();
                return Err(error);
            }
            Err(_) => {
                channel.close();
                payload_channel.close();
                return Err(CreateWorkerError::UnexpectedFailure(WorkerExit {
                    pid,
                    code: None,
                    signal: None,
                }));
            }
        }
        spawn_result_receiver.close();
        drop(running_subscription);

        let inner = Arc::new(Inner {
            id: WorkerId::new(),
            pid,
            executor,
            channel,
            payload_channel,
            handlers: Handlers::default(),
            app_data,
            closed: AtomicBool::new(false),
            died: AtomicBool::new(false),
            routers: Mutex::new(HashedMap::default()),
            _worker_manager: worker_manager,
        });

        inner_weak.lock().replace(Arc::downgrade(&inner));

        Ok(Self { inner })
    }

    /// Worker identifier.
    #[must_use]
    pub fn id(&self) -> WorkerId {
        self.inner.id
    }

    /// Worker process identifier (PID).
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.inner.pid
    }

    /// Custom application data.
    #[must_use]
    pub fn app_data(&self) -> &AppData {
        &self.inner.app_data
    }

    /// Whether the worker is closed.
    #[must_use]
    pub fn closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Whether the worker subprocess died unexpectedly.
    #[must_use]
    pub fn died(&self) -> bool {
        self.inner.died.load(Ordering::SeqCst)
    }

    /// Dump internal state of the worker.
    #[doc(hidden)]
    pub async fn dump(&self) -> Result<WorkerDump, RequestError> {
        debug!("dump()");

        self.inner.channel.request(WorkerDumpRequest {}).await
    }

    /// Get resource usage of the worker subprocess.
    pub async fn get_resource_usage(&self) -> Result<WorkerResourceUsage, RequestError> {
        debug!("get_resource_usage()");

        self.inner
            .channel
            .request(WorkerGetResourceUsageRequest {})
            .await
    }

    /// Update settings of a running worker.
    pub async fn update_settings(&self, settings: WorkerUpdateSettings) -> Result<(), RequestError> {
        debug!("update_settings()");

        self.inner
            .channel
            .request(WorkerUpdateSettingsRequest { data: settings })
            .await
    }

    /// Create a router.
    ///
    /// Worker will be kept alive as long as at least one router instance is alive.
    pub async fn create_router(
        &self,
        router_options: RouterOptions,
    ) -> Result<Router, CreateRouterError> {
        debug!("create_router()");

        let RouterOptions {
            media_codecs,
            app_data,
        } = router_options;

        let rtp_capabilities = ortc::generate_router_rtp_capabilities(media_codecs)
            .map_err(CreateRouterError::FailedRtpCapabilitiesGeneration)?;

        let router_id = RouterId::new();

        self.inner
            .channel
            .request(WorkerCreateRouterRequest {
                internal: RouterInternal { router_id },
            })
            .await
            .map_err(CreateRouterError::Request)?;

        let router = Router::new(
            router_id,
            Arc::clone(&self.inner.executor),
            self.inner.channel.clone(),
            self.inner.payload_channel.clone(),
            rtp_capabilities,
            app_data,
            self.clone(),
        );

        self.inner
            .routers
            .lock()
            .insert(router_id, router.downgrade());
        router
            .on_close({
                let inner_weak = Arc::downgrade(&self.inner);

                move || {
                    if let Some(inner) = inner_weak.upgrade() {
                        inner.routers.lock().remove(&router_id);
                    }
                }
            })
            .detach();

        self.inner.handlers.new_router.call(|callback| {
            callback(&router);
        });

        Ok(router)
    }

    /// Callback is called when a new router is created.
    pub fn on_new_router<F: Fn(&Router) + Send + Sync + 'static>(&self, callback: F) -> HandlerId {
        self.inner.handlers.new_router.add(Arc::new(callback))
    }

    /// Callback is called when the worker subprocess dies unexpectedly; the worker and all its
    /// routers are closed and a replacement worker must be created by the application.
    pub fn on_died<F: FnOnce(&WorkerExit) + Send + 'static>(&self, callback: F) -> HandlerId {
        self.inner.handlers.died.add(Box::new(callback))
    }

    /// Callback is called when the worker is closed for whatever reason.
    pub fn on_close<F: FnOnce() + Send + 'static>(&self, callback: F) -> HandlerId {
        self.inner.handlers.close.add(Box::new(callback))
    }

    /// Close the worker: SIGTERM the subprocess, close both channels and cascade the closure to
    /// every router. Idempotent.
    pub fn close(&self) {
        self.inner.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_args_encoding() {
        let settings = WorkerSettings {
            log_level: WorkerLogLevel::Warn,
            log_tags: vec![WorkerLogTag::Ice, WorkerLogTag::Sctp],
            rtc_min_port: 20000,
            rtc_max_port: 29999,
            dtls_files: Some(WorkerDtlsFiles {
                certificate: "/tmp/cert.pem".into(),
                private_key: "/tmp/key.pem".into(),
            }),
            ..WorkerSettings::default()
        };

        assert_eq!(
            settings.to_args(),
            vec![
                "--logLevel=warn",
                "--logTags=ice",
                "--logTags=sctp",
                "--rtcMinPort=20000",
                "--rtcMaxPort=29999",
                "--dtlsCertificateFile=/tmp/cert.pem",
                "--dtlsPrivateKeyFile=/tmp/key.pem",
            ]
        );
    }

    #[test]
    fn default_settings_args() {
        assert_eq!(
            WorkerSettings::default().to_args(),
            vec!["--logLevel=error", "--rtcMinPort=10000", "--rtcMaxPort=59999"]
        );
    }

    #[test]
    fn explicit_worker_binary_wins() {
        assert_eq!(
            resolve_worker_binary(Some("/opt/media/worker".into())),
            PathBuf::from("/opt/media/worker")
        );
    }

    #[test]
    fn worker_exit_formatting() {
        let exit = WorkerExit {
            pid: 1234,
            code: None,
            signal: Some(signal_name(9)),
        };
        assert_eq!(exit.to_string(), "[pid:1234, code:-, signal:killed]");

        let exit = WorkerExit {
            pid: 1234,
            code: Some(42),
            signal: None,
        };
        assert_eq!(exit.to_string(), "[pid:1234, code:42, signal:-]");
    }

    #[test]
    fn resource_usage_wire_names() {
        let usage: WorkerResourceUsage =
            serde_json::from_str(r#"{"ru_utime":10,"ru_stime":5,"ru_maxrss":1024,"ru_ixrss":0,"ru_idrss":0,"ru_isrss":0,"ru_minflt":2,"ru_majflt":0,"ru_nswap":0,"ru_inblock":0,"ru_oublock":0,"ru_msgsnd":0,"ru_msgrcv":0,"ru_nsignals":0,"ru_nvcsw":1,"ru_nivcsw":1}"#)
                .unwrap();
        assert_eq!(usage.ru_utime, 10);
        assert_eq!(usage.ru_maxrss, 1024);
    }
}
