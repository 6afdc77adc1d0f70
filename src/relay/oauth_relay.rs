use std::fmt;
use std::sync::{Arc, Mutex};

use futures::channel::oneshot;
use futures::future::{self, Either};

use crate::platform::runtime::{poll_until, sleep};
use crate::relay::channel::{
    accept_message, normalize_origin, InboundMessage, MessageBus, MessageListener,
    MessageSubscription,
};
use crate::relay::config::RelayConfig;
use crate::relay::error::{configuration_error, fetch_failed, RelayError, RelayResult};
use crate::relay::fetcher::AuthorizationUrlFetcher;
use crate::relay::logger::LOGGER;
use crate::relay::popup::{PopupHandle, PopupOpener};
use crate::relay::types::{AuthorizationRequest, OutcomeMessage, Platform, RelaySuccess};

/// Which completion source decided a relay invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementPath {
    Message,
    ManualClose,
    Timeout,
}

impl fmt::Display for SettlementPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SettlementPath::Message => "message",
            SettlementPath::ManualClose => "manual-close",
            SettlementPath::Timeout => "timeout",
        })
    }
}

#[derive(Debug)]
enum Completion {
    Message(OutcomeMessage),
    PopupClosed,
    DeadlineElapsed,
}

impl Completion {
    fn path(&self) -> SettlementPath {
        match self {
            Completion::Message(_) => SettlementPath::Message,
            Completion::PopupClosed => SettlementPath::ManualClose,
            Completion::DeadlineElapsed => SettlementPath::Timeout,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RelayState {
    Pending,
    Settled(SettlementPath),
}

/// Single terminal transition shared by the three completion sources.
///
/// The first caller of [`Settlement::try_settle`] moves the state from
/// `Pending` to `Settled` and hands its completion to the waiting relay;
/// every later call is rejected.
struct Settlement {
    state: Mutex<RelayState>,
    sender: Mutex<Option<oneshot::Sender<Completion>>>,
}

impl Settlement {
    fn new(sender: oneshot::Sender<Completion>) -> Self {
        Self {
            state: Mutex::new(RelayState::Pending),
            sender: Mutex::new(Some(sender)),
        }
    }

    fn try_settle(&self, completion: Completion) -> bool {
        {
            let mut state = self.state.lock().unwrap();
            if *state != RelayState::Pending {
                return false;
            }
            *state = RelayState::Settled(completion.path());
        }
        if let Some(sender) = self.sender.lock().unwrap().take() {
            let _ = sender.send(completion);
        }
        true
    }
}

/// Turns a popup-based OAuth flow into one awaitable result.
///
/// Every [`OAuthRelay::connect`] call owns its popup, its message listener,
/// its liveness poll and its deadline; concurrent calls for different
/// platforms share nothing but the message bus.
pub struct OAuthRelay {
    fetcher: Arc<dyn AuthorizationUrlFetcher>,
    opener: Arc<dyn PopupOpener>,
    bus: Arc<dyn MessageBus>,
    origin: String,
    config: RelayConfig,
}

impl OAuthRelay {
    pub fn builder() -> RelayBuilder {
        RelayBuilder::default()
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Runs the authorization flow for `platform`.
    pub async fn connect(&self, platform: &str) -> RelayResult<RelaySuccess> {
        self.connect_request(AuthorizationRequest::for_platform(platform)?)
            .await
    }

    pub async fn connect_request(
        &self,
        request: AuthorizationRequest,
    ) -> RelayResult<RelaySuccess> {
        let platform = request.platform();
        let url = self.fetch_url(platform).await?;

        let popup = PopupHandle::open(
            self.opener.as_ref(),
            &url,
            &self.config.popup_target,
            &self.config.popup_features,
        )
        .inspect_err(|_| LOGGER.warn(format!("authorization popup for {platform} was blocked")))?;
        LOGGER.info(format!("opened authorization popup for {platform}"));

        let (sender, receiver) = oneshot::channel();
        let settlement = Arc::new(Settlement::new(sender));

        let subscription = match self.listen(platform.clone(), settlement.clone()) {
            Ok(subscription) => subscription,
            Err(err) => {
                popup.close();
                return Err(err);
            }
        };

        let completion = self.race(&popup, &settlement, receiver).await;

        // Cleanup precedes the result on every path: the watchers were dropped
        // with the race, the listener goes now, then the popup.
        drop(subscription);
        popup.close();
        LOGGER.info(format!(
            "authorization for {platform} settled via {}",
            completion.path()
        ));

        self.into_result(completion)
    }

    async fn fetch_url(&self, platform: &Platform) -> RelayResult<String> {
        self.fetcher
            .authorization_url(platform)
            .await
            .map_err(|err| match err {
                RelayError::FetchFailed { .. } => err,
                other => fetch_failed(other.to_string()),
            })
    }

    /// Outcomes reported for another platform belong to a concurrent
    /// invocation and leave this one pending.
    fn listen(
        &self,
        platform: Platform,
        settlement: Arc<Settlement>,
    ) -> RelayResult<MessageSubscription> {
        let origin = self.origin.clone();
        let listener: MessageListener = Arc::new(move |message: &InboundMessage| {
            match accept_message(&origin, message) {
                Some(outcome) if outcome.concerns(&platform) => {
                    settlement.try_settle(Completion::Message(outcome));
                }
                _ => {}
            }
        });
        MessageSubscription::attach(self.bus.clone(), listener)
    }

    async fn race(
        &self,
        popup: &PopupHandle,
        settlement: &Settlement,
        receiver: oneshot::Receiver<Completion>,
    ) -> Completion {
        let close_watch = async {
            poll_until(self.config.poll_interval, || popup.is_closed()).await;
            settlement.try_settle(Completion::PopupClosed);
            future::pending::<()>().await
        };
        let deadline = async {
            sleep(self.config.timeout).await;
            settlement.try_settle(Completion::DeadlineElapsed);
            future::pending::<()>().await
        };
        let watchers = std::pin::pin!(future::join(close_watch, deadline));

        match future::select(receiver, watchers).await {
            Either::Left((Ok(completion), _)) => completion,
            // The sender lives inside `settlement`, which outlives the race.
            Either::Left((Err(_), _)) | Either::Right(_) => Completion::PopupClosed,
        }
    }

    fn into_result(&self, completion: Completion) -> RelayResult<RelaySuccess> {
        match completion {
            Completion::Message(OutcomeMessage::Success { data, provider, .. }) => {
                Ok(RelaySuccess::new(data, provider))
            }
            Completion::Message(OutcomeMessage::Error {
                reason, provider, ..
            }) => Err(RelayError::from_callback_reason(reason, provider)),
            Completion::PopupClosed => Err(RelayError::ClosedBeforeCompletion),
            Completion::DeadlineElapsed => Err(RelayError::TimedOut {
                after: self.config.timeout,
            }),
        }
    }
}

impl fmt::Debug for OAuthRelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthRelay")
            .field("origin", &self.origin)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Assembles an [`OAuthRelay`] from its collaborators.
#[derive(Default)]
pub struct RelayBuilder {
    fetcher: Option<Arc<dyn AuthorizationUrlFetcher>>,
    opener: Option<Arc<dyn PopupOpener>>,
    bus: Option<Arc<dyn MessageBus>>,
    origin: Option<String>,
    config: RelayConfig,
}

impl RelayBuilder {
    pub fn with_fetcher(mut self, fetcher: Arc<dyn AuthorizationUrlFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_popup_opener(mut self, opener: Arc<dyn PopupOpener>) -> Self {
        self.opener = Some(opener);
        self
    }

    pub fn with_message_bus(mut self, bus: Arc<dyn MessageBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Origin of the opener page; only messages from this origin are accepted.
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn with_config(mut self, config: RelayConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> RelayResult<OAuthRelay> {
        let fetcher = self
            .fetcher
            .ok_or_else(|| configuration_error("an authorization URL fetcher is required"))?;
        let opener = self
            .opener
            .ok_or_else(|| configuration_error("a popup opener is required"))?;
        let bus = self
            .bus
            .ok_or_else(|| configuration_error("a message bus is required"))?;
        let origin = self
            .origin
            .ok_or_else(|| configuration_error("the opener origin is required"))?;

        if self.config.poll_interval.is_zero() {
            return Err(configuration_error("poll interval must be positive"));
        }

        Ok(OAuthRelay {
            fetcher,
            opener,
            bus,
            origin: normalize_origin(&origin)?,
            config: self.config,
        })
    }
}
