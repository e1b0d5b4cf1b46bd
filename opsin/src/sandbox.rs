use std::fs::File;
use std::io::{BufRead, BufReader};
use std::os::fd::OwnedFd;
use std::os::unix::net::UnixStream;
use std::os::unix::process::CommandExt;
use std::process::{Child, Command};
use std::sync::Arc;

use nix::sys::resource;
use opsin_utils::Communication;

use crate::config::ImageLoaderConfig;
use crate::Error;

/// How the loader is isolated from the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxMechanism {
    /// Loader runs as a separate process with a memory limit
    OutOfProcess,
    /// Loader runs on a dedicated worker thread with a watchdog timeout
    InProcessRestricted,
    /// Loader runs on a worker thread without any restrictions
    NotSandboxed,
}

/// Sandbox strategy requested via [`Loader`](crate::Loader)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SandboxSelector {
    /// Pick the strongest mechanism available for the loader
    #[default]
    Auto,
    /// Skip all isolation
    ///
    /// This is unsafe for images from untrusted sources.
    NotSandboxed,
}

impl SandboxSelector {
    pub(crate) fn determine_sandbox_mechanism(
        self,
        loader_config: &ImageLoaderConfig,
    ) -> SandboxMechanism {
        match self {
            Self::Auto => {
                if loader_config.exec.is_some() {
                    SandboxMechanism::OutOfProcess
                } else {
                    SandboxMechanism::InProcessRestricted
                }
            }
            Self::NotSandboxed => SandboxMechanism::NotSandboxed,
        }
    }
}

/// Running loader, either a child process or a worker thread
pub enum RemoteWorker {
    Process(Child),
    Thread(std::thread::JoinHandle<()>),
}

pub struct Sandbox {
    sandbox_mechanism: SandboxMechanism,
    loader_config: ImageLoaderConfig,
    stdin: UnixStream,
}

impl Sandbox {
    pub fn new(
        sandbox_mechanism: SandboxMechanism,
        loader_config: ImageLoaderConfig,
        stdin: UnixStream,
    ) -> Self {
        Self {
            sandbox_mechanism,
            loader_config,
            stdin,
        }
    }

    /// Starts the loader with its end of the protocol socket
    ///
    /// Returns the worker handle and a debug representation of what was
    /// started, used in error messages.
    pub fn spawn(self) -> crate::Result<(RemoteWorker, String)> {
        match self.sandbox_mechanism {
            SandboxMechanism::OutOfProcess => {
                let exec = self.loader_config.exec.clone().ok_or_else(|| {
                    Error::SpawnError {
                        cmd: String::from("<exec>"),
                        err: Arc::new(std::io::Error::new(
                            std::io::ErrorKind::NotFound,
                            "Loader config carries no Exec entry",
                        )),
                    }
                })?;

                let mut command = Command::new(exec);
                command.stdin(OwnedFd::from(self.stdin));

                // Set memory limit for the loader process
                unsafe {
                    command.pre_exec(|| Ok(set_memory_limit()));
                }

                let cmd_debug = format!("{command:?}");
                let subprocess = command.spawn().map_err(|err| Error::SpawnError {
                    cmd: cmd_debug.clone(),
                    err: Arc::new(err),
                })?;

                Ok((RemoteWorker::Process(subprocess), cmd_debug))
            }
            SandboxMechanism::InProcessRestricted | SandboxMechanism::NotSandboxed => {
                if self.sandbox_mechanism == SandboxMechanism::NotSandboxed {
                    eprintln!("WARNING: Opsin running without sandbox.");
                }

                let constructor =
                    self.loader_config
                        .builtin
                        .ok_or_else(|| Error::SpawnError {
                            cmd: String::from("<builtin>"),
                            err: Arc::new(std::io::Error::new(
                                std::io::ErrorKind::NotFound,
                                "No builtin loader for this format",
                            )),
                        })?;

                let stream = self.stdin;
                let handle = std::thread::Builder::new()
                    .name(String::from("opsin-loader"))
                    .spawn(move || Communication::handle(stream, constructor()))
                    .map_err(|err| Error::SpawnError {
                        cmd: String::from("<builtin>"),
                        err: Arc::new(err),
                    })?;

                Ok((RemoteWorker::Thread(handle), String::from("<builtin loader>")))
            }
        }
    }
}

fn set_memory_limit() {
    // Default to 1 GB memory limit
    let mut limit: resource::rlim_t = 1024 * 1024 * 1024;

    // Lookup free memory
    if let Ok(file) = File::open("/proc/meminfo") {
        let meminfo = BufReader::new(file);

        for line in meminfo.lines().map_while(Result::ok) {
            if line.starts_with("MemAvailable:") {
                if let Some(value) = line
                    .split(' ')
                    .filter(|x| !x.is_empty())
                    .nth(1)
                    .and_then(|x| x.parse::<resource::rlim_t>().ok())
                {
                    limit = value.saturating_mul(1024);
                    // Keep 200 MB free
                    limit = limit.saturating_sub(1024 * 1024 * 200);
                }
            }
        }
    }

    if let Err(err) = resource::setrlimit(resource::Resource::RLIMIT_AS, limit, limit) {
        eprintln!("Error setrlimit(RLIMIT_AS, {limit}): {err}");
    }
}
