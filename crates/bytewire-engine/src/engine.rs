use std::io::{self, Read};
use std::sync::Arc;

use bytewire_frame::{
    Checksum, Composer, ErrorKind, FrameError, Header, Message, ParseEvent, Parser, ParserState,
    ProtocolError, Sink,
};
use tracing::{debug, trace, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::listener::{IdListener, Listen, ListenerId, ListenerTable, Ordered, Registry};
use crate::lock::TxLock;

const READ_CHUNK_SIZE: usize = 1024;

type ErrorHook = Box<dyn FnMut(ErrorKind) + Send>;

/// The frame currently holding the transmit path.
#[derive(Debug, Clone, Copy)]
struct Session {
    id: u32,
    /// The id listener registered for this frame's response.
    query: Option<ListenerId>,
}

/// One endpoint of a framed link.
///
/// Inbound bytes go in through [`Engine::accept`]; verified messages are
/// dispatched to id listeners, then type listeners, then generic listeners.
/// Outbound frames go out through the [`Sink`] given at construction.
/// [`Engine::tick`] drives parser stall recovery and id listener timeouts.
///
/// Listener callbacks receive `&mut Engine`, so they can respond, query
/// or change registrations while a message is being dispatched.
pub struct Engine {
    config: EngineConfig,
    parser: Parser,
    composer: Composer,
    sink: Box<dyn Sink>,
    registry: Registry,
    session: Option<Session>,
    tx_lock: Option<Box<dyn TxLock>>,
    error_hook: Option<ErrorHook>,
}

impl Engine {
    /// Create an engine using the checksum named in the config.
    pub fn new<S: Sink + 'static>(config: EngineConfig, sink: S) -> Result<Self> {
        let checksum = Arc::new(config.frame.checksum);
        Self::with_checksum(config, checksum, sink)
    }

    /// Create an engine with a custom checksum algorithm.
    pub fn with_checksum<S: Sink + 'static>(
        config: EngineConfig,
        checksum: Arc<dyn Checksum>,
        sink: S,
    ) -> Result<Self> {
        config.frame.validate(checksum.as_ref())?;
        debug!(
            checksum_width = checksum.width(),
            peer_bit = config.frame.peer_bit,
            "engine created"
        );

        Ok(Self {
            parser: Parser::with_checksum(config.frame.clone(), Arc::clone(&checksum)),
            composer: Composer::with_checksum(config.frame.clone(), checksum),
            sink: Box::new(sink),
            registry: Registry::new(
                config.max_id_listeners,
                config.max_type_listeners,
                config.max_generic_listeners,
            ),
            session: None,
            tx_lock: None,
            error_hook: None,
            config,
        })
    }

    /// Report protocol errors and failed registrations to `hook`.
    pub fn with_error_hook<F>(mut self, hook: F) -> Self
    where
        F: FnMut(ErrorKind) + Send + 'static,
    {
        self.error_hook = Some(Box::new(hook));
        self
    }

    /// Claim `lock` around every outbound frame in addition to the
    /// engine's own exclusivity.
    pub fn with_tx_lock<L: TxLock + 'static>(mut self, lock: L) -> Self {
        self.tx_lock = Some(Box::new(lock));
        self
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Where the parser is within the current inbound frame.
    pub fn parser_state(&self) -> ParserState {
        self.parser.state()
    }

    /// The id the next fresh (non-response) frame will carry.
    pub fn next_id(&self) -> u32 {
        self.composer.peek_id()
    }

    /// True while a frame holds the transmit path.
    pub fn is_sending(&self) -> bool {
        self.session.is_some()
    }

    /// Number of listeners registered in `table`.
    pub fn listener_count(&self, table: ListenerTable) -> usize {
        self.registry.len(table)
    }

    /// Feed received bytes, dispatching every frame they complete.
    pub fn accept(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.accept_byte(byte);
        }
    }

    /// Feed one received byte.
    pub fn accept_byte(&mut self, byte: u8) {
        match self.parser.accept_byte(byte) {
            Some(ParseEvent::Message(msg)) => self.dispatch(msg),
            Some(ParseEvent::Error(err)) => self.report(err),
            None => {}
        }
    }

    /// Read one chunk from `reader` and feed it. Returns the number of
    /// bytes read; 0 means EOF.
    pub fn read_from<R: Read + ?Sized>(&mut self, reader: &mut R) -> Result<usize> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        let read = loop {
            match reader.read(&mut chunk) {
                Ok(n) => break n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err).into()),
            }
        };
        self.accept(&chunk[..read]);
        Ok(read)
    }

    /// Advance the timebase by one tick.
    ///
    /// Drops a stalled partial frame once the parser has been idle for the
    /// configured number of ticks, and expires id listeners whose timeout
    /// has run out. Each expiry runs its timeout callback, then drops the
    /// listener.
    pub fn tick(&mut self) {
        if let Some(err) = self.parser.tick() {
            self.report(err);
        }
        for expired in self.registry.tick_ids() {
            warn!(id = expired.id, "id listener timed out");
            if let Some(on_timeout) = expired.on_timeout {
                on_timeout(self);
            }
        }
    }

    /// Drop any partial inbound frame. Listeners are untouched.
    pub fn reset_parser(&mut self) {
        self.parser.reset();
    }

    fn dispatch(&mut self, msg: Message) {
        debug!(
            id = msg.id,
            msg_type = msg.msg_type,
            len = msg.len(),
            "dispatching message"
        );

        if let Some((token, mut handler)) = self.registry.take_id(msg.id) {
            let outcome = handler(self, &msg);
            self.registry.restore_id(msg.id, token, handler, outcome);
            if outcome != Listen::Continue {
                return;
            }
        }

        for table in [Ordered::Type, Ordered::Generic] {
            for token in self.registry.matching(table, msg.msg_type) {
                // Gone or already running further up the stack.
                let Some(mut handler) = self.registry.take(table, token) else {
                    continue;
                };
                let outcome = handler(self, &msg);
                self.registry.restore(table, token, handler, outcome);
                if outcome != Listen::Continue {
                    return;
                }
            }
        }

        self.report(ProtocolError::UnhandledMessage {
            id: msg.id,
            msg_type: msg.msg_type,
        });
    }

    fn report(&mut self, err: ProtocolError) {
        warn!(error = %err, "protocol error");
        if let Some(hook) = self.error_hook.as_mut() {
            hook(err.kind());
        }
    }

    /// Listen for frames carrying `id`. Only one listener per id.
    pub fn add_id_listener(&mut self, id: u32, listener: IdListener) -> Result<()> {
        let added = self.registry.add_id(id, listener).map(drop);
        self.registered(added)
    }

    pub fn remove_id_listener(&mut self, id: u32) -> Result<()> {
        self.registry.remove_id(id)
    }

    /// Restart an id listener's timeout from its original value.
    pub fn renew_id_listener(&mut self, id: u32) -> Result<()> {
        self.registry.renew_id(id)
    }

    /// Listen for every frame of `msg_type`.
    pub fn add_type_listener<F>(&mut self, msg_type: u32, handler: F) -> Result<ListenerId>
    where
        F: FnMut(&mut Engine, &Message) -> Listen + Send + 'static,
    {
        let added = self.registry.add(Some(msg_type), Box::new(handler));
        self.registered(added)
    }

    /// Remove the earliest type listener registered for `msg_type`.
    pub fn remove_type_listener(&mut self, msg_type: u32) -> Result<()> {
        self.registry.remove_type(msg_type)
    }

    /// Listen for every frame no id or type listener claims.
    pub fn add_generic_listener<F>(&mut self, handler: F) -> Result<ListenerId>
    where
        F: FnMut(&mut Engine, &Message) -> Listen + Send + 'static,
    {
        let added = self.registry.add(None, Box::new(handler));
        self.registered(added)
    }

    pub fn remove_generic_listener(&mut self, listener: ListenerId) -> Result<()> {
        self.registry.remove(Ordered::Generic, listener)
    }

    fn registered<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            warn!(error = %err, "listener registration failed");
            if let Some(hook) = self.error_hook.as_mut() {
                hook(ErrorKind::RegistrationFailed);
            }
        }
        result
    }

    /// Send a message under a fresh id. Returns the id used.
    pub fn send(&mut self, msg_type: u32, payload: &[u8]) -> Result<u32> {
        self.send_frame(None, msg_type, payload, None)
    }

    /// Send a prepared message; responses keep the id they carry.
    pub fn send_message(&mut self, msg: &Message) -> Result<u32> {
        let id = msg.is_response.then_some(msg.id);
        self.send_frame(id, msg.msg_type, &msg.payload, None)
    }

    /// Send a message and route the reply carrying the same id to
    /// `listener`. The listener is registered before any byte goes out.
    pub fn query(&mut self, msg_type: u32, payload: &[u8], listener: IdListener) -> Result<u32> {
        self.send_frame(None, msg_type, payload, Some(listener))
    }

    /// Answer the frame identified by `id`.
    pub fn respond(&mut self, id: u32, msg_type: u32, payload: &[u8]) -> Result<u32> {
        self.send_frame(Some(id), msg_type, payload, None)
    }

    /// Start a frame whose `len` payload bytes arrive through
    /// [`Engine::multipart_payload`]. The transmit path stays held until
    /// [`Engine::multipart_close`].
    pub fn send_multipart(&mut self, msg_type: u32, len: usize) -> Result<u32> {
        self.open(None, msg_type, len, None)
    }

    /// Multipart counterpart of [`Engine::query`].
    pub fn query_multipart(
        &mut self,
        msg_type: u32,
        len: usize,
        listener: IdListener,
    ) -> Result<u32> {
        self.open(None, msg_type, len, Some(listener))
    }

    /// Multipart counterpart of [`Engine::respond`].
    pub fn respond_multipart(&mut self, id: u32, msg_type: u32, len: usize) -> Result<u32> {
        self.open(Some(id), msg_type, len, None)
    }

    /// Append payload to the open multipart frame.
    ///
    /// Writing past the declared length fails without sending anything and
    /// leaves the frame open.
    pub fn multipart_payload(&mut self, data: &[u8]) -> Result<()> {
        if self.session.is_none() {
            return Err(EngineError::NoOpenMultipart);
        }
        match self.composer.write_payload(data, self.sink.as_mut()) {
            Ok(()) => Ok(()),
            Err(err @ FrameError::PayloadOverrun { .. }) => Err(err.into()),
            Err(err) => {
                self.abort();
                Err(err.into())
            }
        }
    }

    /// Finish the open multipart frame and release the transmit path.
    ///
    /// Closing before the declared length is written fails with
    /// `IncompletePayload` and leaves the frame open.
    pub fn multipart_close(&mut self) -> Result<()> {
        let Some(session) = self.session else {
            return Err(EngineError::NoOpenMultipart);
        };
        match self.composer.close(self.sink.as_mut()) {
            Ok(()) => {
                self.release();
                debug!(id = session.id, "multipart frame sent");
                Ok(())
            }
            Err(err @ FrameError::IncompletePayload { .. }) => Err(err.into()),
            Err(err) => {
                self.abort();
                Err(err.into())
            }
        }
    }

    fn send_frame(
        &mut self,
        response_id: Option<u32>,
        msg_type: u32,
        payload: &[u8],
        listener: Option<IdListener>,
    ) -> Result<u32> {
        let id = self.open(response_id, msg_type, payload.len(), listener)?;

        let sent = match self.composer.write_payload(payload, self.sink.as_mut()) {
            Ok(()) => self.composer.close(self.sink.as_mut()),
            Err(err) => Err(err),
        };
        if let Err(err) = sent {
            self.abort();
            return Err(err.into());
        }

        self.release();
        debug!(id, msg_type, len = payload.len(), "frame sent");
        Ok(id)
    }

    /// Claim the transmit path, register the response listener if any and
    /// write the header. On failure nothing is sent, no usable id is
    /// consumed and no slot stays occupied.
    fn open(
        &mut self,
        response_id: Option<u32>,
        msg_type: u32,
        len: usize,
        listener: Option<IdListener>,
    ) -> Result<u32> {
        if self.session.is_some() {
            return Err(EngineError::TxBusy);
        }

        let id = match response_id {
            Some(id) => id,
            None => match self.fresh_id() {
                Ok(id) => id,
                Err(err) if listener.is_some() => return self.registered(Err(err)),
                Err(err) => return Err(err),
            },
        };
        let header = Header { id, len, msg_type };
        header.check(self.composer.config())?;

        if let Some(lock) = &self.tx_lock {
            if !lock.try_claim() {
                return Err(EngineError::TxBusy);
            }
        }

        let mut query = None;
        if let Some(listener) = listener {
            let added = self.registry.add_id(id, listener);
            match self.registered(added) {
                Ok(token) => query = Some(token),
                Err(err) => {
                    self.release_tx_lock();
                    return Err(err);
                }
            }
        }

        if let Err(err) = self.composer.begin(&header, response_id.is_none()) {
            if let Some(token) = query {
                self.registry.remove_id_token(id, token);
            }
            self.release_tx_lock();
            return Err(err.into());
        }

        self.session = Some(Session { id, query });
        trace!(id, msg_type, len, "frame opened");
        Ok(id)
    }

    /// The next counter id no id listener is waiting on. Held ids are
    /// skipped so a response can never land on the wrong listener.
    fn fresh_id(&mut self) -> Result<u32> {
        let space = u64::from(self.composer.config().id_mask()) + 1;
        let held = self.registry.len(ListenerTable::Id) as u64;
        for _ in 0..space.min(held + 1) {
            let id = self.composer.peek_id();
            if !self.registry.contains_id(id) {
                return Ok(id);
            }
            trace!(id, "id held by a listener, skipping");
            self.composer.skip_id();
        }
        Err(EngineError::IdsExhausted)
    }

    fn release(&mut self) {
        self.session = None;
        self.release_tx_lock();
    }

    /// Give up on the open frame after a transport failure. A listener
    /// waiting for its response would never fire, so it goes too.
    fn abort(&mut self) {
        self.composer.abort();
        if let Some(session) = self.session.take() {
            warn!(id = session.id, "frame aborted");
            if let Some(token) = session.query {
                self.registry.remove_id_token(session.id, token);
            }
        }
        self.release_tx_lock();
    }

    fn release_tx_lock(&mut self) {
        if let Some(lock) = &self.tx_lock {
            lock.release();
        }
    }
}
