//! Scoped termination signal listeners.
//!
//! SIGINT/SIGTERM are routed to the runtime only while at least one
//! [`TerminationSignals`] value is alive. Dropping the last one puts back the
//! dispositions the process had before the first install, so a run that has
//! returned no longer swallows termination signals.
//!
//! The runtime registers its OS-level handler once per process and never
//! removes it. The handler it installed is remembered here and re-applied on
//! every later install.

use crate::types::Result;

pub struct TerminationSignals {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl TerminationSignals {
    #[cfg(unix)]
    pub fn install() -> Result<Self> {
        use crate::types::AppError;
        use tokio::signal::unix::{signal, SignalKind};

        let mut dispositions = disposition::lock();
        dispositions
            .remember_inherited()
            .map_err(|e| AppError::Signal(format!("query dispositions: {}", e)))?;

        let interrupt = signal(SignalKind::interrupt())
            .map_err(|e| AppError::Signal(format!("SIGINT: {}", e)))?;
        let terminate = signal(SignalKind::terminate())
            .map_err(|e| AppError::Signal(format!("SIGTERM: {}", e)))?;

        dispositions
            .arm()
            .map_err(|e| AppError::Signal(format!("arm listeners: {}", e)))?;
        tracing::debug!(live = dispositions.live(), "Termination listeners installed");

        Ok(Self {
            interrupt,
            terminate,
        })
    }

    #[cfg(not(unix))]
    pub fn install() -> Result<Self> {
        Ok(Self {})
    }

    /// Resolves on the first termination signal and names it.
    #[cfg(unix)]
    pub async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
        }
    }

    #[cfg(not(unix))]
    pub async fn recv(&mut self) -> &'static str {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "ctrl_c",
            Err(e) => {
                tracing::error!("Ctrl-C listener failed: {}", e);
                std::future::pending::<&'static str>().await
            }
        }
    }
}

#[cfg(unix)]
impl Drop for TerminationSignals {
    fn drop(&mut self) {
        let mut dispositions = disposition::lock();
        if let Err(e) = dispositions.disarm() {
            tracing::warn!(error = %e, "Failed to restore signal dispositions");
        }
    }
}

#[cfg(unix)]
mod disposition {
    use std::io;
    use std::ptr;
    use std::sync::{Mutex, MutexGuard};

    const HANDLED: [libc::c_int; 2] = [libc::SIGINT, libc::SIGTERM];

    struct Saved {
        signum: libc::c_int,
        inherited: libc::sigaction,
        listener: Option<libc::sigaction>,
    }

    pub(super) struct Dispositions {
        live: usize,
        saved: Vec<Saved>,
    }

    static DISPOSITIONS: Mutex<Dispositions> = Mutex::new(Dispositions {
        live: 0,
        saved: Vec::new(),
    });

    pub(super) fn lock() -> MutexGuard<'static, Dispositions> {
        DISPOSITIONS.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(super) fn current(signum: libc::c_int) -> io::Result<libc::sigaction> {
        // SAFETY: a null `act` only reads the disposition into `old`.
        unsafe {
            let mut old: libc::sigaction = std::mem::zeroed();
            if libc::sigaction(signum, ptr::null(), &mut old) != 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(old)
        }
    }

    fn apply(signum: libc::c_int, action: &libc::sigaction) -> io::Result<()> {
        // SAFETY: `action` was read back from the kernel by `current`.
        if unsafe { libc::sigaction(signum, action, ptr::null_mut()) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    impl Dispositions {
        pub(super) fn live(&self) -> usize {
            self.live
        }

        /// Records the pre-listener disposition once per process.
        pub(super) fn remember_inherited(&mut self) -> io::Result<()> {
            for signum in HANDLED {
                if self.saved.iter().all(|s| s.signum != signum) {
                    self.saved.push(Saved {
                        signum,
                        inherited: current(signum)?,
                        listener: None,
                    });
                }
            }
            Ok(())
        }

        /// Must run after the runtime's listeners were created.
        pub(super) fn arm(&mut self) -> io::Result<()> {
            for saved in &mut self.saved {
                match &saved.listener {
                    Some(action) => apply(saved.signum, action)?,
                    None => saved.listener = Some(current(saved.signum)?),
                }
            }
            self.live += 1;
            Ok(())
        }

        pub(super) fn disarm(&mut self) -> io::Result<()> {
            self.live = self.live.saturating_sub(1);
            if self.live > 0 {
                return Ok(());
            }
            for saved in &self.saved {
                apply(saved.signum, &saved.inherited)?;
            }
            Ok(())
        }
    }
}
