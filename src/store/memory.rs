//! In-process variable store.
//!
//! Stands in for an external variable server: values live here, writers are
//! the control surface and the engine itself, and notifications are pushed
//! into the engine's event channel.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use super::{NotifyKind, ReportSession, SessionId, Store, VarDef, VarHandle, VarType, VarValue};
use crate::error::StoreError;
use crate::event::{Event, EventSender};

/// A variable as seen from outside the engine.
#[derive(Debug, Clone, Serialize)]
pub struct VarView {
    pub name: String,
    #[serde(rename = "type")]
    pub var_type: VarType,
    pub value: VarValue,
}

#[derive(Debug)]
struct Entry {
    name: String,
    var_type: VarType,
    max_len: usize,
    value: VarValue,
    notify: NotifyKind,
}

#[derive(Debug, Default)]
struct Inner {
    vars: Vec<Entry>,
    by_name: HashMap<String, VarHandle>,
    sessions: HashMap<SessionId, (VarHandle, oneshot::Sender<String>)>,
    next_session: SessionId,
}

impl Inner {
    fn entry(&self, handle: VarHandle) -> Result<&Entry, StoreError> {
        self.vars
            .get(handle.0 as usize)
            .ok_or_else(|| StoreError::NotFound(handle.to_string()))
    }

    fn lookup(&self, name: &str) -> Result<VarHandle, StoreError> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }
}

fn check(entry_name: &str, var_type: VarType, max_len: usize, value: &VarValue) -> Result<(), StoreError> {
    if value.var_type() != var_type {
        return Err(StoreError::TypeMismatch {
            name: entry_name.to_string(),
            declared: var_type,
            given: value.var_type(),
        });
    }
    if let VarValue::Str(s) = value {
        if max_len > 0 && s.len() > max_len {
            return Err(StoreError::TooLong {
                name: entry_name.to_string(),
                max_len,
            });
        }
    }
    Ok(())
}

/// Thread-safe in-memory [`Store`].
#[derive(Debug)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    events: EventSender,
}

impl MemoryStore {
    /// Opens a store that delivers notifications into `events`.
    ///
    /// # Errors
    /// Returns [`StoreError::Closed`] if nobody is listening on the channel.
    pub fn open(events: EventSender) -> Result<Self, StoreError> {
        if events.is_closed() {
            return Err(StoreError::Closed);
        }
        Ok(Self {
            inner: Mutex::new(Inner::default()),
            events,
        })
    }

    /// Current value of a variable by name.
    pub fn value_of(&self, name: &str) -> Option<VarValue> {
        let inner = self.inner.lock();
        let handle = inner.by_name.get(name)?;
        inner.vars.get(handle.0 as usize).map(|e| e.value.clone())
    }

    pub fn describe(&self, name: &str) -> Option<VarView> {
        let inner = self.inner.lock();
        let handle = inner.by_name.get(name)?;
        inner.vars.get(handle.0 as usize).map(|e| VarView {
            name: e.name.clone(),
            var_type: e.var_type,
            value: e.value.clone(),
        })
    }

    /// All variables, in creation order.
    pub fn list(&self) -> Vec<VarView> {
        self.inner
            .lock()
            .vars
            .iter()
            .map(|e| VarView {
                name: e.name.clone(),
                var_type: e.var_type,
                value: e.value.clone(),
            })
            .collect()
    }

    /// Notification kind registered for a variable.
    pub fn notify_kind(&self, name: &str) -> Option<NotifyKind> {
        let inner = self.inner.lock();
        let handle = inner.by_name.get(name)?;
        inner.vars.get(handle.0 as usize).map(|e| e.notify)
    }

    /// Writes the textual form of a value, parsed per the variable's type.
    pub fn set_text(&self, name: &str, text: &str) -> Result<(), StoreError> {
        let (handle, var_type) = {
            let inner = self.inner.lock();
            let handle = inner.lookup(name)?;
            (handle, inner.entry(handle)?.var_type)
        };
        let value = VarValue::parse(var_type, name, text)?;
        self.set(handle, value)
    }

    /// Asks the engine for a report on a print-notified variable.
    ///
    /// Announces a new session through the event channel and returns the
    /// receiving end the report body will arrive on.
    pub fn request_report(&self, name: &str) -> Result<oneshot::Receiver<String>, StoreError> {
        let (tx, rx) = oneshot::channel();
        let id = {
            let mut inner = self.inner.lock();
            let handle = inner.lookup(name)?;
            if inner.entry(handle)?.notify != NotifyKind::Print {
                return Err(StoreError::NotReportable(name.to_string()));
            }
            let id = inner.next_session;
            inner.next_session = inner.next_session.wrapping_add(1);
            inner.sessions.insert(id, (handle, tx));
            id
        };

        if self.events.send(Event::ReportRequested(id)).is_err() {
            self.inner.lock().sessions.remove(&id);
            return Err(StoreError::Closed);
        }
        debug!("Opened report request {} for {}", id, name);
        Ok(rx)
    }
}

impl Store for MemoryStore {
    fn create(&self, def: &VarDef) -> Result<VarHandle, StoreError> {
        let mut inner = self.inner.lock();
        if inner.by_name.contains_key(&def.name) {
            return Err(StoreError::AlreadyExists(def.name.clone()));
        }
        let value = match &def.initial {
            Some(value) => {
                check(&def.name, def.var_type, def.max_len, value)?;
                value.clone()
            }
            None => VarValue::zero(def.var_type),
        };
        let handle = VarHandle(inner.vars.len() as u32);
        inner.vars.push(Entry {
            name: def.name.clone(),
            var_type: def.var_type,
            max_len: def.max_len,
            value,
            notify: NotifyKind::None,
        });
        inner.by_name.insert(def.name.clone(), handle);
        trace!("Created variable {} as {}", def.name, handle);
        Ok(handle)
    }

    fn find(&self, name: &str) -> Option<(VarHandle, VarType)> {
        let inner = self.inner.lock();
        let handle = *inner.by_name.get(name)?;
        inner.vars.get(handle.0 as usize).map(|e| (handle, e.var_type))
    }

    fn get(&self, handle: VarHandle) -> Result<VarValue, StoreError> {
        Ok(self.inner.lock().entry(handle)?.value.clone())
    }

    fn set(&self, handle: VarHandle, value: VarValue) -> Result<(), StoreError> {
        let notify = {
            let mut inner = self.inner.lock();
            let entry = inner
                .vars
                .get_mut(handle.0 as usize)
                .ok_or_else(|| StoreError::NotFound(handle.to_string()))?;
            check(&entry.name, entry.var_type, entry.max_len, &value)?;
            entry.value = value;
            entry.notify
        };

        // Every write notifies, even an unchanged value: trigger variables
        // rely on it.
        if notify == NotifyKind::Modified && self.events.send(Event::VariableChanged(handle)).is_err() {
            warn!("Dropping change notification for {}: dispatcher is gone", handle);
        }
        Ok(())
    }

    fn notify(&self, handle: VarHandle, kind: NotifyKind) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let entry = inner
            .vars
            .get_mut(handle.0 as usize)
            .ok_or_else(|| StoreError::NotFound(handle.to_string()))?;
        entry.notify = kind;
        Ok(())
    }

    fn open_report_session(&self, id: SessionId) -> Result<ReportSession, StoreError> {
        self.inner
            .lock()
            .sessions
            .remove(&id)
            .map(|(handle, sink)| ReportSession::new(handle, sink))
            .ok_or(StoreError::NoSession(id))
    }
}
