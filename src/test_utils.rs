use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::lifecycle::Component;

/// Serializes tests that install termination listeners or raise signals, so
/// no test sees another's dispositions.
pub static SIGNAL_LOCK: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Started(&'static str),
    CancelObserved(&'static str),
    Exited(&'static str),
    TeardownStarted(&'static str),
    TeardownFinished(&'static str),
}

#[derive(Default)]
struct LogInner {
    events: Vec<(Event, Instant)>,
    deadlines: Vec<(&'static str, Duration)>,
}

/// Shared, ordered record of what mock components did.
#[derive(Clone, Default)]
pub struct EventLog {
    inner: Arc<Mutex<LogInner>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: Event) {
        self.inner
            .lock()
            .unwrap()
            .events
            .push((event, Instant::now()));
    }

    fn record_deadline(&self, name: &'static str, deadline: Duration) {
        self.inner.lock().unwrap().deadlines.push((name, deadline));
    }

    pub fn events(&self) -> Vec<Event> {
        self.timed_events().into_iter().map(|(e, _)| e).collect()
    }

    pub fn timed_events(&self) -> Vec<(Event, Instant)> {
        self.inner.lock().unwrap().events.clone()
    }

    pub fn teardown_order(&self) -> Vec<&'static str> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::TeardownStarted(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    pub fn teardown_deadlines(&self) -> Vec<(&'static str, Duration)> {
        self.inner.lock().unwrap().deadlines.clone()
    }

    /// Poll until `predicate` holds; panics after five seconds.
    pub async fn wait_for<P>(&self, predicate: P)
    where
        P: Fn(&[Event]) -> bool,
    {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !predicate(&self.events()) {
            if Instant::now() >= deadline {
                panic!("condition not reached, events: {:?}", self.events());
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[derive(Debug, Clone)]
pub enum RunBehavior {
    BlockUntilCancelled,
    ReturnImmediately,
    Fail(String),
    FailAfter(Duration, String),
    FailOnCancel(String),
    LingerAfterCancel(Duration),
    CancelTwiceThenFail(String),
    Panic,
}

#[derive(Debug, Clone)]
pub enum TeardownBehavior {
    Succeed,
    Fail(String),
    Delay(Duration),
    Panic,
}

pub struct MockComponent {
    name: &'static str,
    log: EventLog,
    run: RunBehavior,
    teardown: TeardownBehavior,
    advertised_deadline: Option<Duration>,
}

impl MockComponent {
    pub fn new(name: &'static str, log: &EventLog) -> Self {
        Self {
            name,
            log: log.clone(),
            run: RunBehavior::BlockUntilCancelled,
            teardown: TeardownBehavior::Succeed,
            advertised_deadline: None,
        }
    }

    pub fn with_run(mut self, run: RunBehavior) -> Self {
        self.run = run;
        self
    }

    pub fn with_teardown(mut self, teardown: TeardownBehavior) -> Self {
        self.teardown = teardown;
        self
    }

    pub fn with_advertised_deadline(mut self, deadline: Duration) -> Self {
        self.advertised_deadline = Some(deadline);
        self
    }

    async fn wait_cancelled(&self, cancel: &CancellationToken) {
        cancel.cancelled().await;
        self.log.record(Event::CancelObserved(self.name));
    }

    async fn run_script(&self, cancel: CancellationToken) -> anyhow::Result<()> {
        match &self.run {
            RunBehavior::BlockUntilCancelled => {
                self.wait_cancelled(&cancel).await;
                Ok(())
            }
            RunBehavior::ReturnImmediately => Ok(()),
            RunBehavior::Fail(msg) => Err(anyhow::anyhow!("{}", msg)),
            RunBehavior::FailAfter(delay, msg) => {
                tokio::select! {
                    _ = tokio::time::sleep(*delay) => Err(anyhow::anyhow!("{}", msg)),
                    _ = self.wait_cancelled(&cancel) => Ok(()),
                }
            }
            RunBehavior::FailOnCancel(msg) => {
                self.wait_cancelled(&cancel).await;
                Err(anyhow::anyhow!("{}", msg))
            }
            RunBehavior::LingerAfterCancel(linger) => {
                self.wait_cancelled(&cancel).await;
                tokio::time::sleep(*linger).await;
                Ok(())
            }
            RunBehavior::CancelTwiceThenFail(msg) => {
                cancel.cancel();
                cancel.cancel();
                Err(anyhow::anyhow!("{}", msg))
            }
            RunBehavior::Panic => panic!("{} exploded", self.name),
        }
    }
}

#[async_trait]
impl Component for MockComponent {
    fn name(&self) -> &'static str {
        self.name
    }

    fn teardown_deadline(&self) -> Option<Duration> {
        self.advertised_deadline
    }

    async fn run(&self, cancel: CancellationToken) -> anyhow::Result<()> {
        self.log.record(Event::Started(self.name));
        let result = self.run_script(cancel).await;
        self.log.record(Event::Exited(self.name));
        result
    }

    async fn teardown(&self, deadline: Duration) -> anyhow::Result<()> {
        self.log.record(Event::TeardownStarted(self.name));
        self.log.record_deadline(self.name, deadline);

        let result = match &self.teardown {
            TeardownBehavior::Succeed => Ok(()),
            TeardownBehavior::Fail(msg) => Err(anyhow::anyhow!("{}", msg)),
            TeardownBehavior::Delay(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(())
            }
            TeardownBehavior::Panic => panic!("{} teardown exploded", self.name),
        };

        self.log.record(Event::TeardownFinished(self.name));
        result
    }
}
