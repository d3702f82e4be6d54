use std::collections::HashMap;
use std::fmt;

use bytewire_frame::Message;

use crate::engine::Engine;
use crate::error::{EngineError, Result};

/// What a listener wants done after seeing a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Listen {
    /// Handled. Keep the listener and stop dispatch.
    Stay,
    /// Not handled here; offer the message to the next match.
    Continue,
    /// Handled. Restart an id listener's timeout and stop dispatch.
    Renew,
    /// Handled. Remove the listener and stop dispatch.
    Close,
}

/// A message callback. Per-listener state lives in whatever it captures.
pub type Handler = Box<dyn FnMut(&mut Engine, &Message) -> Listen + Send>;

/// Called once when an id listener expires.
pub type TimeoutHandler = Box<dyn FnOnce(&mut Engine) + Send>;

/// Handle for a registered type or generic listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// The three listener tables, in dispatch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerTable {
    Id,
    Type,
    Generic,
}

impl fmt::Display for ListenerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ListenerTable::Id => "id",
            ListenerTable::Type => "type",
            ListenerTable::Generic => "generic",
        })
    }
}

/// A listener waiting for frames carrying one specific id, typically the
/// response to a query.
///
/// ```
/// use bytewire_engine::{IdListener, Listen};
///
/// let listener = IdListener::new(|_engine, msg| {
///     println!("response: {:?}", msg.payload);
///     Listen::Close
/// })
/// .timeout(50)
/// .on_timeout(|_engine| println!("no response"));
/// # drop(listener);
/// ```
pub struct IdListener {
    pub(crate) handler: Handler,
    pub(crate) timeout: u32,
    pub(crate) on_timeout: Option<TimeoutHandler>,
}

impl IdListener {
    /// A listener that never expires.
    pub fn new<F>(handler: F) -> Self
    where
        F: FnMut(&mut Engine, &Message) -> Listen + Send + 'static,
    {
        Self {
            handler: Box::new(handler),
            timeout: 0,
            on_timeout: None,
        }
    }

    /// Expire after this many ticks without a match. 0 means never.
    pub fn timeout(mut self, ticks: u32) -> Self {
        self.timeout = ticks;
        self
    }

    /// Callback run when the listener expires.
    pub fn on_timeout<F>(mut self, on_timeout: F) -> Self
    where
        F: FnOnce(&mut Engine) + Send + 'static,
    {
        self.on_timeout = Some(Box::new(on_timeout));
        self
    }
}

impl fmt::Debug for IdListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdListener")
            .field("timeout", &self.timeout)
            .field("on_timeout", &self.on_timeout.is_some())
            .finish_non_exhaustive()
    }
}

/// The two ordered tables. Id listeners are keyed by id instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Ordered {
    Type,
    Generic,
}

impl Ordered {
    pub fn table(self) -> ListenerTable {
        match self {
            Ordered::Type => ListenerTable::Type,
            Ordered::Generic => ListenerTable::Generic,
        }
    }
}

struct IdEntry {
    token: ListenerId,
    /// `None` while the handler is running.
    handler: Option<Handler>,
    timeout: u32,
    remaining: u32,
    on_timeout: Option<TimeoutHandler>,
}

struct Entry {
    token: ListenerId,
    /// `None` for generic listeners.
    msg_type: Option<u32>,
    handler: Option<Handler>,
}

/// An id listener whose countdown reached zero.
pub(crate) struct Expired {
    pub id: u32,
    pub on_timeout: Option<TimeoutHandler>,
}

/// The three listener tables.
///
/// Handlers are taken out of their slot while they run, so a handler can
/// reach the engine (and this registry) without aliasing itself. The slot
/// stays occupied and is refilled by token afterwards, unless the handler
/// removed or replaced its own registration in the meantime.
pub(crate) struct Registry {
    ids: HashMap<u32, IdEntry>,
    types: Vec<Entry>,
    generics: Vec<Entry>,
    max_ids: usize,
    max_types: usize,
    max_generics: usize,
    next_token: u64,
}

impl Registry {
    pub fn new(max_ids: usize, max_types: usize, max_generics: usize) -> Self {
        Self {
            ids: HashMap::with_capacity(max_ids),
            types: Vec::with_capacity(max_types),
            generics: Vec::with_capacity(max_generics),
            max_ids,
            max_types,
            max_generics,
            next_token: 0,
        }
    }

    fn token(&mut self) -> ListenerId {
        self.next_token += 1;
        ListenerId(self.next_token)
    }

    pub fn len(&self, table: ListenerTable) -> usize {
        match table {
            ListenerTable::Id => self.ids.len(),
            ListenerTable::Type => self.types.len(),
            ListenerTable::Generic => self.generics.len(),
        }
    }

    pub fn add_id(&mut self, id: u32, listener: IdListener) -> Result<ListenerId> {
        if self.ids.contains_key(&id) {
            return Err(EngineError::DuplicateIdListener(id));
        }
        if self.ids.len() >= self.max_ids {
            return Err(EngineError::ListenerTableFull {
                table: ListenerTable::Id,
                capacity: self.max_ids,
            });
        }
        let token = self.token();
        self.ids.insert(
            id,
            IdEntry {
                token,
                handler: Some(listener.handler),
                timeout: listener.timeout,
                remaining: listener.timeout,
                on_timeout: listener.on_timeout,
            },
        );
        Ok(token)
    }

    pub fn contains_id(&self, id: u32) -> bool {
        self.ids.contains_key(&id)
    }

    /// Remove the id listener only if it is still the registration `token`
    /// names. Returns whether anything was removed.
    pub fn remove_id_token(&mut self, id: u32, token: ListenerId) -> bool {
        if self.ids.get(&id).is_some_and(|e| e.token == token) {
            self.ids.remove(&id);
            return true;
        }
        false
    }

    pub fn remove_id(&mut self, id: u32) -> Result<()> {
        self.ids
            .remove(&id)
            .map(drop)
            .ok_or(EngineError::ListenerNotFound {
                table: ListenerTable::Id,
            })
    }

    pub fn renew_id(&mut self, id: u32) -> Result<()> {
        let entry = self.ids.get_mut(&id).ok_or(EngineError::ListenerNotFound {
            table: ListenerTable::Id,
        })?;
        entry.remaining = entry.timeout;
        Ok(())
    }

    pub fn add(&mut self, msg_type: Option<u32>, handler: Handler) -> Result<ListenerId> {
        let (list, capacity) = match msg_type {
            Some(_) => (Ordered::Type, self.max_types),
            None => (Ordered::Generic, self.max_generics),
        };
        if self.list(list).len() >= capacity {
            return Err(EngineError::ListenerTableFull {
                table: list.table(),
                capacity,
            });
        }
        let token = self.token();
        self.list_mut(list).push(Entry {
            token,
            msg_type,
            handler: Some(handler),
        });
        Ok(token)
    }

    /// Remove the earliest type listener registered for `msg_type`.
    pub fn remove_type(&mut self, msg_type: u32) -> Result<()> {
        let pos = self
            .types
            .iter()
            .position(|e| e.msg_type == Some(msg_type))
            .ok_or(EngineError::ListenerNotFound {
                table: ListenerTable::Type,
            })?;
        self.types.remove(pos);
        Ok(())
    }

    pub fn remove(&mut self, table: Ordered, token: ListenerId) -> Result<()> {
        let list = self.list_mut(table);
        let pos = list
            .iter()
            .position(|e| e.token == token)
            .ok_or(EngineError::ListenerNotFound {
                table: table.table(),
            })?;
        list.remove(pos);
        Ok(())
    }

    pub fn take_id(&mut self, id: u32) -> Option<(ListenerId, Handler)> {
        let entry = self.ids.get_mut(&id)?;
        let handler = entry.handler.take()?;
        Some((entry.token, handler))
    }

    pub fn restore_id(&mut self, id: u32, token: ListenerId, handler: Handler, outcome: Listen) {
        if !self.ids.get(&id).is_some_and(|e| e.token == token) {
            // Removed or replaced while running; the old handler is dropped.
            return;
        }
        if outcome == Listen::Close {
            self.ids.remove(&id);
            return;
        }
        if let Some(entry) = self.ids.get_mut(&id) {
            if outcome == Listen::Renew {
                entry.remaining = entry.timeout;
            }
            entry.handler = Some(handler);
        }
    }

    /// Tokens of the type or generic listeners that match, in slot order.
    pub fn matching(&self, table: Ordered, msg_type: u32) -> Vec<ListenerId> {
        self.list(table)
            .iter()
            .filter(|e| e.msg_type.is_none_or(|t| t == msg_type))
            .map(|e| e.token)
            .collect()
    }

    pub fn take(&mut self, table: Ordered, token: ListenerId) -> Option<Handler> {
        self.list_mut(table)
            .iter_mut()
            .find(|e| e.token == token)?
            .handler
            .take()
    }

    pub fn restore(
        &mut self,
        table: Ordered,
        token: ListenerId,
        handler: Handler,
        outcome: Listen,
    ) {
        let list = self.list_mut(table);
        let Some(pos) = list.iter().position(|e| e.token == token) else {
            return;
        };
        if outcome == Listen::Close {
            list.remove(pos);
        } else {
            list[pos].handler = Some(handler);
        }
    }

    /// Count every timed id listener down by one tick and remove the ones
    /// that reach zero, in id order.
    pub fn tick_ids(&mut self) -> Vec<Expired> {
        let mut expired: Vec<u32> = self
            .ids
            .iter_mut()
            .filter(|(_, e)| e.remaining > 0)
            .filter_map(|(&id, e)| {
                e.remaining -= 1;
                (e.remaining == 0).then_some(id)
            })
            .collect();
        expired.sort_unstable();

        expired
            .into_iter()
            .filter_map(|id| {
                let entry = self.ids.remove(&id)?;
                Some(Expired {
                    id,
                    on_timeout: entry.on_timeout,
                })
            })
            .collect()
    }

    fn list(&self, table: Ordered) -> &Vec<Entry> {
        match table {
            Ordered::Type => &self.types,
            Ordered::Generic => &self.generics,
        }
    }

    fn list_mut(&mut self, table: Ordered) -> &mut Vec<Entry> {
        match table {
            Ordered::Type => &mut self.types,
            Ordered::Generic => &mut self.generics,
        }
    }
}
