//! Scripted mock reader transport
//!
//! A deterministic [`ReaderTransport`] for driving the presentation engine
//! without hardware. The script controls reader behavior at every protocol
//! step (discoverability, connection outcome, authentication reply,
//! credential reply) and the mock keeps counters the retry and cleanup
//! assertions need. The mock answers AUTH_REQUEST by actually decrypting
//! the challenge with the shared key, so both directions of the codec are
//! exercised.

#![allow(dead_code)]

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex,
};

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use tessera_core::{
    crypto,
    errors::TransportError,
    transport::{PowerState, ReaderTransport},
    types::{DeviceKey, NONCE_SIZE},
    wire,
};

pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x0000aa10_0000_1000_8000_00805f9b34fb);
pub const CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0x0000aa11_0000_1000_8000_00805f9b34fb);

pub const TEST_DEVICE_ID: &str = "a1b2c3d4e5f6a1b2c3d4e5f6a1b2c3d4";
pub const TEST_DEVICE_KEY: &str = "13f75379273f324d31335278a66062af";
pub const TEST_CREDENTIAL: &str = "prod-pin_access_tool-7603489";

// ----------------------------------------------------------------------------
// Reader Script
// ----------------------------------------------------------------------------

/// How the scripted reader answers an AUTH_REQUEST.
#[derive(Debug, Clone, Copy)]
pub enum AuthBehavior {
    /// Well-formed response echoing the received challenge.
    EchoNonce,
    /// Valid ciphertext whose echoed challenge has one bit flipped.
    WrongEcho,
    /// An ERROR frame with the given code.
    ReaderError(u8),
    /// No reply at all.
    Silent,
    /// Power the radio off instead of answering, as if the adapter died
    /// mid-session.
    RadioOff,
}

/// How the scripted reader answers a CREDENTIAL frame.
#[derive(Debug, Clone, Copy)]
pub enum CredentialBehavior {
    Status(u8),
    ReaderError(u8),
    Silent,
    /// Power the radio off instead of answering.
    RadioOff,
}

/// Scripted behavior for one mock reader.
#[derive(Debug, Clone)]
pub struct ReaderScript {
    /// Whether a reader is discoverable at all.
    pub advertise: bool,
    /// Number of initial connection attempts to refuse.
    pub connect_failures: usize,
    pub auth: AuthBehavior,
    pub credential: CredentialBehavior,
    /// Empty notification frames pushed ahead of every real reply.
    pub empty_frames_before_reply: usize,
}

impl Default for ReaderScript {
    fn default() -> Self {
        Self {
            advertise: true,
            connect_failures: 0,
            auth: AuthBehavior::EchoNonce,
            credential: CredentialBehavior::Status(0x00),
            empty_frames_before_reply: 0,
        }
    }
}

// ----------------------------------------------------------------------------
// Mock Transport
// ----------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MockPeripheral {
    pub name: String,
}

pub struct MockReader {
    key: DeviceKey,
    script: ReaderScript,
    power_tx: watch::Sender<PowerState>,
    /// Kept alive so an advertise-less scan times out instead of closing.
    scan_tx: Mutex<Option<mpsc::Sender<MockPeripheral>>>,
    notify_tx: Mutex<Option<mpsc::Sender<Vec<u8>>>>,

    pub scans: AtomicUsize,
    pub connects: AtomicUsize,
    pub disconnects: AtomicUsize,
    pub unsubscribes: AtomicUsize,
    pub writes: AtomicUsize,
    /// Every nonce_M the reader has seen, in order.
    pub seen_challenges: Mutex<Vec<[u8; NONCE_SIZE]>>,
    remaining_connect_failures: AtomicUsize,
}

impl MockReader {
    pub fn new(script: ReaderScript) -> Self {
        Self::with_power(script, PowerState::PoweredOn)
    }

    pub fn with_power(script: ReaderScript, power: PowerState) -> Self {
        let (power_tx, _) = watch::channel(power);
        let connect_failures = script.connect_failures;
        Self {
            key: DeviceKey::from_hex(TEST_DEVICE_KEY).unwrap(),
            script,
            power_tx,
            scan_tx: Mutex::new(None),
            notify_tx: Mutex::new(None),
            scans: AtomicUsize::new(0),
            connects: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
            unsubscribes: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            seen_challenges: Mutex::new(Vec::new()),
            remaining_connect_failures: AtomicUsize::new(connect_failures),
        }
    }

    /// Flip the simulated radio power.
    pub fn set_power(&self, state: PowerState) {
        self.power_tx.send_replace(state);
    }

    pub fn challenge_count(&self) -> usize {
        self.seen_challenges.lock().unwrap().len()
    }

    fn notify(&self, frame: Vec<u8>) {
        let sender = self
            .notify_tx
            .lock()
            .unwrap()
            .clone()
            .expect("reply without an active subscription");
        sender.try_send(frame).expect("notification channel full");
    }

    fn reply(&self, frame: Option<Vec<u8>>) {
        for _ in 0..self.script.empty_frames_before_reply {
            self.notify(Vec::new());
        }
        if let Some(frame) = frame {
            self.notify(frame);
        }
    }

    fn answer_auth_request(&self, frame: &[u8]) {
        assert_eq!(frame.len(), wire::AUTH_REQUEST_LEN, "malformed AUTH_REQUEST");
        let iv = &frame[17..33];
        let ciphertext = &frame[33..65];
        let challenge = crypto::decrypt(self.key.as_bytes(), iv, ciphertext).unwrap();
        assert_eq!(challenge.len(), NONCE_SIZE);

        let mut received = [0u8; NONCE_SIZE];
        received.copy_from_slice(&challenge);
        self.seen_challenges.lock().unwrap().push(received);

        let reply = match self.script.auth {
            AuthBehavior::Silent => None,
            AuthBehavior::RadioOff => {
                self.power_tx.send_replace(PowerState::PoweredOff);
                None
            }
            AuthBehavior::ReaderError(code) => Some(vec![wire::MSG_ERROR, code]),
            AuthBehavior::EchoNonce | AuthBehavior::WrongEcho => {
                let mut echoed = received;
                if matches!(self.script.auth, AuthBehavior::WrongEcho) {
                    echoed[0] ^= 0x01;
                }
                let mut plaintext = Vec::with_capacity(2 * NONCE_SIZE);
                plaintext.extend_from_slice(&echoed);
                plaintext.extend_from_slice(&[0x5A; NONCE_SIZE]); // reader challenge
                let (iv, ct) = crypto::encrypt(self.key.as_bytes(), &plaintext, None).unwrap();
                let mut frame = vec![wire::MSG_AUTH_RESPONSE];
                frame.extend_from_slice(&iv);
                frame.extend_from_slice(&ct);
                Some(frame)
            }
        };
        self.reply(reply);
    }

    fn answer_credential(&self, frame: &[u8]) {
        assert!(frame.len() >= 17, "malformed CREDENTIAL frame");
        // Decryptability is part of the contract even though the mock does
        // not inspect the credential text.
        crypto::decrypt(self.key.as_bytes(), &frame[1..17], &frame[17..]).unwrap();

        let reply = match self.script.credential {
            CredentialBehavior::Silent => None,
            CredentialBehavior::RadioOff => {
                self.power_tx.send_replace(PowerState::PoweredOff);
                None
            }
            CredentialBehavior::Status(status) => {
                Some(vec![wire::MSG_CREDENTIAL_RESPONSE, status])
            }
            CredentialBehavior::ReaderError(code) => Some(vec![wire::MSG_ERROR, code]),
        };
        self.reply(reply);
    }
}

#[async_trait]
impl ReaderTransport for MockReader {
    type Peripheral = MockPeripheral;
    type Characteristic = Uuid;

    fn power_state(&self) -> PowerState {
        *self.power_tx.borrow()
    }

    fn power_changes(&self) -> watch::Receiver<PowerState> {
        self.power_tx.subscribe()
    }

    async fn start_scan(
        &self,
        service: Uuid,
    ) -> Result<mpsc::Receiver<MockPeripheral>, TransportError> {
        assert_eq!(service, SERVICE_UUID);
        self.scans.fetch_add(1, Ordering::SeqCst);

        let (tx, rx) = mpsc::channel(4);
        if self.script.advertise {
            tx.try_send(MockPeripheral {
                name: "tessera-reader".to_string(),
            })
            .unwrap();
        }
        *self.scan_tx.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    async fn stop_scan(&self) {
        *self.scan_tx.lock().unwrap() = None;
    }

    fn peripheral_name(&self, peripheral: &MockPeripheral) -> Option<String> {
        Some(peripheral.name.clone())
    }

    async fn connect(&self, _peripheral: &MockPeripheral) -> Result<(), TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let remaining = self.remaining_connect_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.remaining_connect_failures
                .store(remaining - 1, Ordering::SeqCst);
            return Err(TransportError::ConnectFailed("refused".into()));
        }
        Ok(())
    }

    async fn discover_service(
        &self,
        _peripheral: &MockPeripheral,
        service: Uuid,
    ) -> Result<(), TransportError> {
        assert_eq!(service, SERVICE_UUID);
        Ok(())
    }

    async fn discover_characteristic(
        &self,
        _peripheral: &MockPeripheral,
        _service: Uuid,
        characteristic: Uuid,
    ) -> Result<Uuid, TransportError> {
        assert_eq!(characteristic, CHARACTERISTIC_UUID);
        Ok(characteristic)
    }

    async fn subscribe(
        &self,
        _peripheral: &MockPeripheral,
        _characteristic: &Uuid,
    ) -> Result<(), TransportError> {
        Ok(())
    }

    async fn notifications(
        &self,
        _peripheral: &MockPeripheral,
        _characteristic: &Uuid,
    ) -> Result<mpsc::Receiver<Vec<u8>>, TransportError> {
        let (tx, rx) = mpsc::channel(8);
        *self.notify_tx.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    async fn write_without_response(
        &self,
        _peripheral: &MockPeripheral,
        _characteristic: &Uuid,
        bytes: &[u8],
    ) -> Result<(), TransportError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        assert!(!bytes.is_empty());
        match bytes[0] {
            wire::MSG_AUTH_REQUEST => self.answer_auth_request(bytes),
            wire::MSG_CREDENTIAL => self.answer_credential(bytes),
            other => panic!("unexpected frame type {other:#04x}"),
        }
        Ok(())
    }

    async fn unsubscribe(&self, _peripheral: &MockPeripheral, _characteristic: &Uuid) {
        self.unsubscribes.fetch_add(1, Ordering::SeqCst);
        *self.notify_tx.lock().unwrap() = None;
    }

    async fn disconnect(&self, _peripheral: &MockPeripheral) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}
