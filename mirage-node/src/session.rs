//! One authenticated conversation with a camera over a single transport.
//!
//! The session owns the request counter and the shared key, wraps each
//! request in the envelope its transport needs (AES-GCM on BLE once paired,
//! an HMAC `Authorization` header on HTTPS), and waits for the reply with a
//! deadline. Sends are serialized internally: the camera answers one request
//! at a time and BLE replies carry no correlation id.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use mirage_keys::{CryptoProvider, SharedKey};
use mirage_proto::ble::https::CONTROL_PATH;
use mirage_proto::{CameraApiRequest, CameraApiResponse};
use tokio::sync::Mutex;

use crate::catalog::{self, Command, CommandOutput};
use crate::request::{now_millis, request_name};
use crate::transport::{HttpsTransport, Outgoing, Transport, TransportKind};
use crate::{Error, RequestIds, TransportError, auth};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Session<T> {
    transport: T,
    crypto: Arc<dyn CryptoProvider>,
    shared_key: Option<SharedKey>,
    ids: RequestIds,
    timeout: Duration,
    in_flight: Mutex<()>,
    unusable: AtomicBool,
}

/// How long a send may wait, and which error to report when it runs out
#[derive(Debug, Clone, Copy)]
struct Budget {
    wait: Duration,
    ends_at_expiry: bool,
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T, crypto: Arc<dyn CryptoProvider>) -> Self {
        Self {
            transport,
            crypto,
            shared_key: None,
            ids: RequestIds::new(),
            timeout: DEFAULT_TIMEOUT,
            in_flight: Mutex::new(()),
            unusable: AtomicBool::new(false),
        }
    }

    pub fn with_shared_key(mut self, key: SharedKey) -> Self {
        self.shared_key = Some(key);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_request_ids(mut self, ids: RequestIds) -> Self {
        self.ids = ids;
        self
    }

    pub fn set_shared_key(&mut self, key: SharedKey) {
        self.shared_key = Some(key);
    }

    pub fn shared_key(&self) -> Option<&SharedKey> {
        self.shared_key.as_ref()
    }

    pub fn is_paired(&self) -> bool {
        self.shared_key.is_some()
    }

    pub fn is_usable(&self) -> bool {
        !self.unusable.load(Ordering::Acquire)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn crypto(&self) -> &Arc<dyn CryptoProvider> {
        &self.crypto
    }

    pub fn ids(&self) -> &RequestIds {
        &self.ids
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Build, send and unwrap a catalog command.
    pub async fn execute(&self, command: &Command) -> Result<CommandOutput, Error> {
        let request = catalog::build(&self.ids, command)?;
        tracing::info!(
            command = command.name(),
            request_id = request.request_id().unwrap_or_default(),
            transport = %self.transport.kind(),
            "sending command"
        );
        let response = self.send(&request).await?;
        command.interpret(response)
    }

    /// Send with the envelope the session's state calls for: BLE requests
    /// are encrypted once a shared key is installed.
    pub async fn send(&self, request: &CameraApiRequest) -> Result<CameraApiResponse, Error> {
        let encrypt = self.transport.kind() == TransportKind::Ble && self.shared_key.is_some();
        self.send_with(request, encrypt).await
    }

    /// Send with an explicit choice of BLE encryption. HTTPS requests are
    /// never encrypted and always signed.
    pub async fn send_with(
        &self,
        request: &CameraApiRequest,
        encrypt: bool,
    ) -> Result<CameraApiResponse, Error> {
        let command = request_name(request.kind());
        self.ensure_usable()?;

        let _turn = self.in_flight.lock().await;
        // A send that failed while this one waited may have poisoned the link
        self.ensure_usable()?;

        let encrypt = encrypt && self.transport.kind() == TransportKind::Ble;
        let outgoing = self.seal(request, encrypt)?;
        let budget = self.budget(request, command)?;

        tracing::debug!(command, bytes = outgoing.body.len(), encrypt, "request out");
        let reply = self.dispatch(command, budget, self.transport.send(outgoing)).await?;
        let sent_id = request.request_id().filter(|id| *id != 0);

        let plain = if encrypt {
            let key = self.shared_key.as_ref().ok_or(Error::NotPaired)?;
            self.crypto.decrypt(key, &reply).map_err(|e| {
                self.poison(command, "undecryptable reply");
                Error::Protocol { command, reason: format!("cannot decrypt reply: {e}") }
            })?
        } else {
            reply
        };

        let response = CameraApiResponse::from_bytes(&plain).map_err(|e| {
            self.poison(command, "undecodable reply");
            Error::Protocol { command, reason: format!("cannot decode reply: {e}") }
        })?;
        if response.status().is_none() {
            self.poison(command, "reply without status");
            return Err(Error::Protocol {
                command,
                reason: "reply has no status code".to_string(),
            });
        }
        // Id 0 means the camera did not echo the header
        if let Some(sent) = sent_id {
            if response.request_id != 0 && response.request_id != sent {
                self.poison(command, "reply for another request");
                return Err(Error::Protocol {
                    command,
                    reason: format!("reply is for request {}, sent {sent}", response.request_id),
                });
            }
        }

        tracing::debug!(command, status = ?response.status(), "reply in");
        Ok(response)
    }

    /// The envelope `send_with(request, encrypt)` would put on the transport
    pub fn seal(&self, request: &CameraApiRequest, encrypt: bool) -> Result<Outgoing, Error> {
        let body = request.to_bytes();
        match self.transport.kind() {
            TransportKind::Ble if encrypt => {
                let key = self.shared_key.as_ref().ok_or(Error::NotPaired)?;
                Ok(Outgoing::new(self.crypto.encrypt(key, &body)?))
            }
            TransportKind::Ble => Ok(Outgoing::new(body)),
            TransportKind::Https => {
                let key = self.shared_key.as_ref().ok_or(Error::NotPaired)?;
                let signature = auth::sign(key, "POST", CONTROL_PATH, &body);
                Ok(Outgoing::signed(body, auth::authorization(&signature)))
            }
        }
    }

    fn ensure_usable(&self) -> Result<(), Error> {
        if self.is_usable() {
            Ok(())
        } else {
            Err(Error::SessionUnusable)
        }
    }

    fn poison(&self, command: &'static str, why: &str) {
        tracing::warn!(command, why, "session no longer usable");
        self.unusable.store(true, Ordering::Release);
    }

    /// Requests without a header (key exchange) only get the call timeout.
    fn budget(&self, request: &CameraApiRequest, command: &'static str) -> Result<Budget, Error> {
        let Some(expires) = request.expiration_timestamp().filter(|t| *t > 0) else {
            return Ok(Budget { wait: self.timeout, ends_at_expiry: false });
        };

        let left = expires - now_millis();
        if left <= 0 {
            return Err(Error::Expired { command });
        }
        let left = Duration::from_millis(left as u64);
        Ok(if left < self.timeout {
            Budget { wait: left, ends_at_expiry: true }
        } else {
            Budget { wait: self.timeout, ends_at_expiry: false }
        })
    }

    async fn dispatch<F>(&self, command: &'static str, budget: Budget, exchange: F) -> Result<Vec<u8>, Error>
    where
        F: Future<Output = Result<Vec<u8>, TransportError>>,
    {
        let mut pending = Pending { session_unusable: &self.unusable, command, settled: false };
        let outcome = tokio::time::timeout(budget.wait, exchange).await;
        pending.settled = true;

        match outcome {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(e)) => {
                if e.is_fatal() {
                    self.poison(command, "transport failure");
                }
                Err(Error::transport(command, e))
            }
            Err(_) => {
                self.poison(command, "no reply in time");
                Err(if budget.ends_at_expiry {
                    Error::Expired { command }
                } else {
                    Error::Timeout { command, after: budget.wait }
                })
            }
        }
    }
}

/// Poisons the session when a caller drops a send while its reply is still
/// owed: the late reply would otherwise answer the next request.
struct Pending<'a> {
    session_unusable: &'a AtomicBool,
    command: &'static str,
    settled: bool,
}

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::warn!(command = self.command, "send abandoned while awaiting a reply; session no longer usable");
            self.session_unusable.store(true, Ordering::Release);
        }
    }
}

impl Session<HttpsTransport> {
    /// GET `/media/<path>`
    pub async fn fetch_media(&self, media_path: &str) -> Result<Vec<u8>, Error> {
        let command = "fetch_media";
        let key = self.shared_key.as_ref().ok_or(Error::NotPaired)?;
        self.ensure_usable()?;
        let _turn = self.in_flight.lock().await;
        let budget = Budget { wait: self.timeout, ends_at_expiry: false };
        self.dispatch(command, budget, self.transport.fetch_media(media_path, key)).await
    }

    /// DELETE `/media/<path>`
    pub async fn delete_media(&self, media_path: &str) -> Result<(), Error> {
        let command = "delete_media";
        let key = self.shared_key.as_ref().ok_or(Error::NotPaired)?;
        self.ensure_usable()?;
        let _turn = self.in_flight.lock().await;
        let budget = Budget { wait: self.timeout, ends_at_expiry: false };
        let exchange = async {
            self.transport.delete_media(media_path, key).await?;
            Ok::<_, TransportError>(Vec::new())
        };
        self.dispatch(command, budget, exchange).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirage_keys::P256Provider;
    use mirage_proto::RequestType;

    /// Never answers
    struct Silent(TransportKind);

    #[async_trait::async_trait]
    impl Transport for Silent {
        fn kind(&self) -> TransportKind {
            self.0
        }

        async fn send(&self, _outgoing: Outgoing) -> Result<Vec<u8>, TransportError> {
            std::future::pending().await
        }
    }

    /// Answers every request with the same bytes
    struct Canned(Vec<u8>);

    #[async_trait::async_trait]
    impl Transport for Canned {
        fn kind(&self) -> TransportKind {
            TransportKind::Ble
        }

        async fn send(&self, _outgoing: Outgoing) -> Result<Vec<u8>, TransportError> {
            Ok(self.0.clone())
        }
    }

    fn answering(request_id: i64) -> Session<Canned> {
        let mut reply = CameraApiResponse::with_status(mirage_proto::StatusCode::Ok);
        reply.request_id = request_id;
        Session::new(Canned(reply.to_bytes()), Arc::new(P256Provider::new()))
    }

    fn session(kind: TransportKind) -> Session<Silent> {
        Session::new(Silent(kind), Arc::new(P256Provider::new()))
    }

    #[test]
    fn https_envelope_is_signed_not_encrypted() {
        let session = session(TransportKind::Https).with_shared_key(SharedKey::new(b"secret-key".to_vec()));
        let request = session.ids().new_request(RequestType::Status);

        let outgoing = session.seal(&request, true).unwrap();
        assert_eq!(outgoing.body, request.to_bytes());
        let expected = auth::sign(session.shared_key().unwrap(), "POST", "/daydreamcamera", &outgoing.body);
        assert_eq!(outgoing.authorization, Some(format!("daydreamcamera {expected}")));
    }

    #[test]
    fn https_needs_a_key() {
        let session = session(TransportKind::Https);
        let request = session.ids().new_request(RequestType::Status);
        assert!(matches!(session.seal(&request, false), Err(Error::NotPaired)));
    }

    #[test]
    fn ble_encryption_needs_a_key() {
        let session = session(TransportKind::Ble);
        let request = session.ids().new_request(RequestType::Status);
        assert!(matches!(session.seal(&request, true), Err(Error::NotPaired)));
        assert_eq!(session.seal(&request, false).unwrap().body, request.to_bytes());
    }

    #[tokio::test(start_paused = true)]
    async fn silence_times_out_and_poisons_the_session() {
        let session = session(TransportKind::Ble).with_timeout(Duration::from_secs(10));
        let request = session.ids().new_request(RequestType::Status);

        let err = session.send(&request).await.unwrap_err();
        assert!(matches!(err, Error::Timeout { command: "status", after } if after == Duration::from_secs(10)));
        assert!(!session.is_usable());

        let again = session.ids().new_request(RequestType::Status);
        assert!(matches!(session.send(&again).await, Err(Error::SessionUnusable)));
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_during_the_wait_poisons_the_session() {
        let session = session(TransportKind::Ble).with_timeout(Duration::from_secs(60));
        let mut request = session.ids().new_request(RequestType::Status);
        request.header.as_mut().unwrap().expiration_timestamp = now_millis() + 1_000;

        let err = session.send(&request).await.unwrap_err();
        assert!(matches!(err, Error::Expired { command: "status" }));
        assert!(!session.is_usable());
    }

    #[tokio::test]
    async fn reply_for_another_request_is_rejected() {
        let session = answering(7);
        let request = session.ids().new_request(RequestType::Status);

        let err = session.send(&request).await.unwrap_err();
        assert!(matches!(err, Error::Protocol { command: "status", .. }));
        assert!(!session.is_usable());
    }

    #[tokio::test]
    async fn reply_without_an_id_is_accepted() {
        let session = answering(0);
        let request = session.ids().new_request(RequestType::Status);

        assert!(session.send(&request).await.unwrap().is_ok());
        assert!(session.is_usable());
    }

    #[tokio::test]
    async fn expired_request_fails_before_io() {
        let session = session(TransportKind::Ble);
        let mut request = session.ids().new_request(RequestType::Status);
        request.header.as_mut().unwrap().expiration_timestamp = now_millis() - 1;

        assert!(matches!(session.send(&request).await, Err(Error::Expired { command: "status" })));
        // Nothing went out, so the link is still good
        assert!(session.is_usable());
    }

    #[test]
    fn short_expiry_caps_the_wait() {
        let session = session(TransportKind::Ble).with_timeout(Duration::from_secs(60));
        let request = session.ids().new_request(RequestType::Status);
        let budget = session.budget(&request, "status").unwrap();
        assert!(budget.ends_at_expiry);
        assert!(budget.wait <= Duration::from_secs(40));

        let key_exchange = catalog::key_exchange(catalog::KeyExchange::Initiate, &[4], &[1]);
        let budget = session.budget(&key_exchange, "key_exchange_initiate").unwrap();
        assert!(!budget.ends_at_expiry);
        assert_eq!(budget.wait, Duration::from_secs(60));
    }
}
