//! Link session to the bike's control unit.
//!
//! The session owns every piece of link state and is driven from the main
//! loop: [`Session::poll`] applies the events posted by the radio context,
//! runs a pending connect and then hands out at most one decoded sample.

use crate::link::protocol::{self, AssistSettings, WriteMask};
use crate::link::queue::Inbox;
use crate::link::transport::{matches_signature, Channel, Transport};
use crate::link::types::{
    ConnectionParams, LinkEvent, LinkState, PeerAddress, SessionConfig, SignalSample,
};
use crate::signals::{SignalId, Tick};
use std::time::{Duration, Instant};

/// Delay between two polls of a synchronous read.
const SYNC_POLL_DELAY: Duration = Duration::from_millis(1);

/// Frame after which the bike pauses notifications for a moment.
const NOTIFICATION_PAUSE: [u8; 2] = [0x02, 0x27];

/// Session state machine over a [`Transport`].
pub struct Session<T: Transport> {
    transport: T,
    inbox: Inbox,
    config: SessionConfig,
    state: LinkState,
    subscribed: bool,
    auto_reconnect: bool,
    authenticated: bool,
    /// Id of the in-flight read request
    pending: Option<SignalId>,
    /// Last matching peer
    peer: Option<PeerAddress>,
    connect_requested: bool,
    epoch: Instant,
}

impl<T: Transport> Session<T> {
    /// Create a session. `inbox` must belong to the radio handle the
    /// transport posts to.
    pub fn new(transport: T, inbox: Inbox, config: SessionConfig) -> Self {
        Self {
            transport,
            inbox,
            config,
            state: LinkState::Disconnected,
            subscribed: false,
            auto_reconnect: false,
            authenticated: false,
            pending: None,
            peer: None,
            connect_requested: false,
            epoch: Instant::now(),
        }
    }

    /// Start the link. Returns `false` if bluetooth is unusable.
    pub fn init(&mut self) -> bool {
        if !self.config.enabled || self.config.passkey == 0 {
            tracing::info!("Bike link disabled");
            self.state = LinkState::Off;
            self.auto_reconnect = false;
            return false;
        }

        self.state = LinkState::Disconnected;
        self.auto_reconnect = true;
        self.start_scan()
    }

    /// Milliseconds since the session was created.
    pub fn now(&self) -> Tick {
        self.epoch.elapsed().as_millis() as Tick
    }

    /// Current link state. An idle session without auto-reconnect is `Off`.
    pub fn link_state(&self) -> LinkState {
        if self.state == LinkState::Disconnected && !self.auto_reconnect {
            LinkState::Off
        } else {
            self.state
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == LinkState::Connected
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    pub fn auto_reconnect(&self) -> bool {
        self.auto_reconnect
    }

    /// Id of the in-flight read request, if any.
    pub fn pending_request(&self) -> Option<SignalId> {
        self.pending
    }

    /// Number of notification frames dropped on a full queue.
    pub fn overrun_count(&self) -> u32 {
        self.inbox.overrun_count()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    fn start_scan(&mut self) -> bool {
        match self.transport.start_scan() {
            Ok(()) => {
                tracing::debug!("Scanning for bike");
                true
            }
            Err(e) => {
                tracing::warn!("Failed to start scan: {}", e);
                false
            }
        }
    }

    /// Apply one radio event.
    fn handle_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Advertisement {
                address,
                manufacturer_data,
            } => {
                if self.state != LinkState::Disconnected || !self.auto_reconnect {
                    return;
                }
                if !matches_signature(&manufacturer_data) {
                    tracing::trace!("Ignoring advertisement from {}", address);
                    return;
                }

                tracing::info!("Found bike at {}", address);
                if let Err(e) = self.transport.stop_scan() {
                    tracing::warn!("Failed to stop scan: {}", e);
                }
                self.peer = Some(address);
                self.state = LinkState::Connecting;
                self.connect_requested = true;
            }
            LinkEvent::AuthenticationComplete { encrypted } => {
                if encrypted {
                    tracing::info!("Encrypted connection established");
                    self.authenticated = true;
                } else {
                    tracing::warn!("Encryption failed, disconnecting");
                    self.authenticated = false;
                    self.state = LinkState::AuthFailed;
                    if let Err(e) = self.transport.disconnect() {
                        tracing::warn!("Disconnect failed: {}", e);
                    }
                }
            }
            LinkEvent::Disconnected => {
                tracing::info!("Bike disconnected");
                // frames of the old connection are stale
                self.inbox.clear_frames();
                self.state = LinkState::Disconnected;
                self.subscribed = false;
                self.authenticated = false;
                self.pending = None;
                self.connect_requested = false;
                if self.auto_reconnect {
                    self.start_scan();
                }
            }
        }
    }

    /// Run the connect attempt requested by discovery or reconnect.
    fn connect_to_peer(&mut self) {
        let peer = match self.peer.clone() {
            Some(peer) => peer,
            None => return,
        };

        tracing::info!("Connecting to bike: {}", peer);

        match self.transport.connect(&peer, self.config.passkey) {
            Ok(()) => {
                self.state = LinkState::Connected;
                tracing::info!("Connected to bike: {}", peer);

                if let Err(e) = self
                    .transport
                    .update_connection_params(ConnectionParams::LOW_POWER)
                {
                    tracing::debug!("Connection parameters not updated: {}", e);
                }

                self.subscribe();
            }
            Err(e) => {
                tracing::warn!("Connection to {} failed: {}", peer, e);
                self.state = LinkState::Disconnected;
                if self.auto_reconnect {
                    self.start_scan();
                }
            }
        }
    }

    /// Drive the session and return the next sample, if any.
    ///
    /// Notification frames take precedence; the read-back channel is only
    /// polled while a request is pending and the queue is empty.
    pub fn poll(&mut self) -> Option<SignalSample> {
        while let Some(event) = self.inbox.pop_event() {
            self.handle_event(event);
        }

        if self.connect_requested {
            self.connect_requested = false;
            self.connect_to_peer();
        }

        if let Some(frame) = self.inbox.pop_frame() {
            let sample = protocol::decode_frame(&frame, self.now());
            tracing::trace!("Frame {:02x?} -> {:?}", frame, sample.id);

            if sample.is_unknown() && frame.starts_with(&NOTIFICATION_PAUSE) {
                self.read_async(SignalId::BattSizeWh, false);
            }
            return Some(sample);
        }

        let requested = self.pending?;
        if !self.is_connected() {
            return None;
        }

        match self.transport.read(Channel::ReadBack) {
            Ok(frame) => {
                let sample = protocol::parse_read_back(&frame, requested, self.now())?;
                tracing::debug!("Read-back {:?} = {:?}", requested, sample.value);
                self.pending = None;
                Some(sample)
            }
            Err(e) => {
                tracing::debug!("Read-back failed: {}", e);
                None
            }
        }
    }

    /// Enable notifications. Reads the data channel first to trigger pairing.
    pub fn subscribe(&mut self) -> bool {
        if !self.is_connected() {
            return false;
        }

        if !self.authenticated {
            if let Err(e) = self.transport.read(Channel::Data) {
                tracing::debug!("Pairing read failed: {}", e);
            }
        }

        match self.transport.subscribe() {
            Ok(()) => {
                tracing::info!("Subscribed to bike notifications");
                self.subscribed = true;
                true
            }
            Err(e) => {
                tracing::warn!("Notification subscription failed: {}", e);
                if let Err(e) = self.transport.disconnect() {
                    tracing::warn!("Disconnect failed: {}", e);
                }
                false
            }
        }
    }

    /// Disable notifications.
    pub fn unsubscribe(&mut self) -> bool {
        if !self.is_connected() {
            return false;
        }

        match self.transport.unsubscribe() {
            Ok(()) => {
                tracing::info!("Unsubscribed from bike notifications");
                self.subscribed = false;
                true
            }
            Err(e) => {
                tracing::warn!("Notification unsubscribe failed: {}", e);
                if let Err(e) = self.transport.disconnect() {
                    tracing::warn!("Disconnect failed: {}", e);
                }
                false
            }
        }
    }

    /// Tear down the link and stay idle.
    pub fn disconnect(&mut self) {
        tracing::info!("Disconnect requested");
        self.auto_reconnect = false;
        self.connect_requested = false;

        match self.state {
            LinkState::Connected | LinkState::AuthFailed => {
                if let Err(e) = self.transport.disconnect() {
                    tracing::warn!("Disconnect failed: {}", e);
                }
            }
            LinkState::Connecting => self.state = LinkState::Disconnected,
            LinkState::Disconnected => {
                if let Err(e) = self.transport.stop_scan() {
                    tracing::debug!("Failed to stop scan: {}", e);
                }
            }
            LinkState::Off => {}
        }
    }

    /// Re-enable the link, reusing the last peer when known.
    pub fn reconnect(&mut self) {
        if !self.config.enabled || self.config.passkey == 0 {
            return;
        }

        tracing::info!("Reconnect requested");
        self.auto_reconnect = true;

        match self.state {
            LinkState::Connected | LinkState::Connecting => {}
            _ => {
                self.state = LinkState::Disconnected;
                if self.peer.is_some() {
                    self.state = LinkState::Connecting;
                    self.connect_requested = true;
                } else {
                    self.start_scan();
                }
            }
        }
    }

    /// Start a read request. Returns `false` if another request is pending
    /// and `force` is not set, or the request could not be sent.
    pub fn read_async(&mut self, id: SignalId, force: bool) -> bool {
        if !self.is_connected() {
            return false;
        }
        if self.pending.is_some() && !force {
            return false;
        }

        let frame = match protocol::build_request(id) {
            Some(frame) => frame,
            None => {
                tracing::debug!("{} cannot be requested", id);
                return false;
            }
        };

        match self.transport.write(Channel::Request, &frame) {
            Ok(()) => {
                tracing::debug!("Requested {}", id);
                self.pending = Some(id);
                true
            }
            Err(e) => {
                tracing::warn!("Request for {} failed: {}", id, e);
                false
            }
        }
    }

    /// Abandon the in-flight request.
    pub fn cancel_request(&mut self) {
        self.pending = None;
    }

    /// Request `id` and poll until it arrives or `timeout` elapses.
    ///
    /// Blocks the calling thread. Samples of other signals received in the
    /// meantime are discarded.
    pub fn read_sync(&mut self, id: SignalId, timeout: Duration) -> Option<SignalSample> {
        if !self.read_async(id, true) {
            return None;
        }

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(sample) = self.poll() {
                if sample.id == Some(id) {
                    if self.pending == Some(id) {
                        self.pending = None;
                    }
                    return Some(sample);
                }
            }
            if Instant::now() >= deadline {
                break;
            }
            std::thread::sleep(SYNC_POLL_DELAY);
        }

        tracing::debug!("Read of {} timed out", id);
        self.pending = None;
        None
    }

    /// Read the current assist level (0..=3).
    pub fn assist_level(&mut self) -> Option<u8> {
        let timeout = Duration::from_millis(self.config.sync_read_timeout_ms);
        self.read_sync(SignalId::MotAssistLevel, timeout)
            .and_then(|s| s.value.as_f32())
            .map(|v| v as u8)
    }

    fn write_frame(&mut self, frame: Option<Vec<u8>>) -> bool {
        if !self.is_connected() {
            tracing::debug!("Write dropped, not connected");
            return false;
        }
        let frame = match frame {
            Some(frame) => frame,
            None => {
                tracing::debug!("Write dropped, value out of range");
                return false;
            }
        };

        match self.transport.write(Channel::Write, &frame) {
            Ok(()) => {
                tracing::debug!("Wrote {:02x?}", frame);
                true
            }
            Err(e) => {
                tracing::warn!("Write failed: {}", e);
                false
            }
        }
    }

    /// Select the active assist level (0 off .. 3 turbo).
    pub fn write_assist_level(&mut self, level: u8) -> bool {
        self.write_frame(protocol::build_assist_level(level))
    }

    /// Set the peak assist percentage of the three levels.
    pub fn write_peak_assist(&mut self, levels: [u8; 3]) -> bool {
        self.write_frame(protocol::build_peak_assist(levels))
    }

    /// Set the assist percentage of one level (`index` 0..3).
    pub fn write_assist(&mut self, index: usize, percent: u8) -> bool {
        self.write_frame(protocol::build_assist(index, percent))
    }

    pub fn write_shuttle(&mut self, percent: u8) -> bool {
        self.write_frame(protocol::build_shuttle(percent))
    }

    pub fn write_accel_sensitivity(&mut self, percent: u8) -> bool {
        self.write_frame(protocol::build_accel_sensitivity(percent))
    }

    pub fn write_fake_channel(&mut self, value: u8) -> bool {
        self.write_frame(protocol::build_fake_channel(value))
    }

    /// Read the motor tuning block field by field.
    ///
    /// Notifications are paused during the reads. Fields that time out stay
    /// `None`; check [`AssistSettings::is_complete`].
    pub fn read_assist_settings(&mut self, timeout: Duration) -> Option<AssistSettings> {
        if !self.is_connected() {
            return None;
        }

        let resubscribe = self.subscribed;
        if resubscribe {
            self.unsubscribe();
        }

        let mut settings = AssistSettings::default();
        for id in AssistSettings::FIELDS {
            match self.read_sync(id, timeout) {
                Some(sample) => settings.apply(&sample),
                None => tracing::warn!("No answer for {}", id),
            }
        }

        if resubscribe {
            self.subscribe();
        }

        Some(settings)
    }

    /// Write the masked fields of the tuning block.
    ///
    /// Fields that are unset or out of range are skipped individually.
    pub fn write_assist_settings(&mut self, settings: &AssistSettings, mask: WriteMask) -> bool {
        if !self.is_connected() {
            return false;
        }

        let resubscribe = self.subscribed;
        if resubscribe {
            self.unsubscribe();
        }

        let mut ok = true;
        for frame in settings.build_frames(mask) {
            ok &= self.write_frame(Some(frame));
        }

        if resubscribe {
            self.subscribe();
        }

        ok
    }
}
