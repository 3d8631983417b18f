//! Named, typed configuration variables.
//!
//! [`Store`] is the boundary to the external variable store: it owns the
//! authoritative values, allocates handles and delivers change notifications.
//! [`ConfigStore`] is the engine's view of it: a local cache of the last
//! observed value of every registered variable, plus the table that says what
//! a change to each variable should do.

pub mod memory;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::{ConfigError, StoreError};

pub use memory::MemoryStore;

/// Process-local handle to a registered variable. Stable for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarHandle(pub(crate) u32);

impl fmt::Display for VarHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier of a pending report (print) session.
pub type SessionId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VarType {
    #[serde(rename = "uint16")]
    U16,
    #[serde(rename = "uint32")]
    U32,
    #[serde(rename = "string")]
    Str,
}

impl fmt::Display for VarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VarType::U16 => "uint16",
            VarType::U32 => "uint32",
            VarType::Str => "string",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum VarValue {
    U16(u16),
    U32(u32),
    Str(String),
}

impl VarValue {
    pub fn var_type(&self) -> VarType {
        match self {
            VarValue::U16(_) => VarType::U16,
            VarValue::U32(_) => VarType::U32,
            VarValue::Str(_) => VarType::Str,
        }
    }

    /// The zero value of a type: `0` or the empty string.
    pub fn zero(var_type: VarType) -> Self {
        match var_type {
            VarType::U16 => VarValue::U16(0),
            VarType::U32 => VarValue::U32(0),
            VarType::Str => VarValue::Str(String::new()),
        }
    }

    /// Numeric value widened to `u32`. Strings yield `None`.
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            VarValue::U16(v) => Some(u32::from(*v)),
            VarValue::U32(v) => Some(*v),
            VarValue::Str(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            VarValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Parses the textual form of a value of the given type.
    ///
    /// # Errors
    /// Returns [`StoreError::InvalidValue`] if `text` is not a valid number
    /// for a numeric type.
    pub fn parse(var_type: VarType, name: &str, text: &str) -> Result<Self, StoreError> {
        let invalid = |e: std::num::ParseIntError| StoreError::InvalidValue {
            name: name.to_string(),
            reason: e.to_string(),
        };
        match var_type {
            VarType::U16 => text.trim().parse().map(VarValue::U16).map_err(invalid),
            VarType::U32 => text.trim().parse().map(VarValue::U32).map_err(invalid),
            VarType::Str => Ok(VarValue::Str(text.to_string())),
        }
    }
}

impl fmt::Display for VarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarValue::U16(v) => write!(f, "{v}"),
            VarValue::U32(v) => write!(f, "{v}"),
            VarValue::Str(s) => f.write_str(s),
        }
    }
}

/// Which notification this process wants for a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotifyKind {
    #[default]
    None,
    /// Deliver [`Event::VariableChanged`](crate::event::Event) on every write.
    Modified,
    /// Deliver [`Event::ReportRequested`](crate::event::Event) when a reader asks for it.
    Print,
}

/// Everything needed to create (or look up) a variable.
#[derive(Debug, Clone)]
pub struct VarDef {
    pub name: String,
    pub var_type: VarType,
    /// Byte bound for string values. `0` means unbounded; ignored for numbers.
    pub max_len: usize,
    pub notify: NotifyKind,
    /// Value given to the variable if this process creates it.
    pub initial: Option<VarValue>,
}

impl VarDef {
    pub fn new(name: impl Into<String>, var_type: VarType) -> Self {
        Self {
            name: name.into(),
            var_type,
            max_len: 0,
            notify: NotifyKind::None,
            initial: None,
        }
    }

    pub fn max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len;
        self
    }

    pub fn notify(mut self, notify: NotifyKind) -> Self {
        self.notify = notify;
        self
    }

    pub fn initial(mut self, value: VarValue) -> Self {
        self.initial = Some(value);
        self
    }
}

/// An open report session: the requester is waiting for the body.
///
/// Dropping the session without writing closes it empty.
#[derive(Debug)]
pub struct ReportSession {
    handle: VarHandle,
    sink: oneshot::Sender<String>,
}

impl ReportSession {
    pub fn new(handle: VarHandle, sink: oneshot::Sender<String>) -> Self {
        Self { handle, sink }
    }

    /// The variable the report was requested from.
    pub fn handle(&self) -> VarHandle {
        self.handle
    }

    /// Writes the report body and closes the session.
    pub fn write(self, body: String) {
        if self.sink.send(body).is_err() {
            debug!("Report requester for {} went away", self.handle);
        }
    }
}

/// The external variable store.
///
/// Implementations own the authoritative values and may be shared with other
/// processes; reads through this trait are eventually consistent.
pub trait Store: Send + Sync {
    /// Creates a new variable. Fails with [`StoreError::AlreadyExists`] if
    /// the name is taken.
    fn create(&self, def: &VarDef) -> Result<VarHandle, StoreError>;

    /// Looks up an existing variable by name.
    fn find(&self, name: &str) -> Option<(VarHandle, VarType)>;

    fn get(&self, handle: VarHandle) -> Result<VarValue, StoreError>;

    /// Writes a value, notifying any observer of the variable.
    fn set(&self, handle: VarHandle, value: VarValue) -> Result<(), StoreError>;

    /// Requests notifications of the given kind for a variable.
    fn notify(&self, handle: VarHandle, kind: NotifyKind) -> Result<(), StoreError>;

    /// Claims a pending report session announced by [`Event::ReportRequested`](crate::event::Event).
    fn open_report_session(&self, id: SessionId) -> Result<ReportSession, StoreError>;
}

/// What a change notification for a variable should make the dispatcher do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnChange {
    /// Refresh the cached value only.
    Nothing,
    /// Refresh, then re-arm the broadcast timer from the new rate.
    RearmTimer,
    /// Run a broadcast cycle now.
    Broadcast,
}

#[derive(Debug)]
struct CachedVar {
    name: String,
    max_len: usize,
    value: VarValue,
    on_change: OnChange,
}

/// Local cache and dispatch table over an external [`Store`].
pub struct ConfigStore {
    store: Arc<dyn Store>,
    vars: BTreeMap<VarHandle, CachedVar>,
}

impl ConfigStore {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            vars: BTreeMap::new(),
        }
    }

    /// Registers a variable, creating it if needed.
    ///
    /// If another process already created a variable of that name, it is
    /// reused as long as its declared type matches. The handle's dispatch
    /// entry is fixed here, once.
    ///
    /// # Errors
    /// Returns [`ConfigError::TypeMismatch`] if a pre-existing variable has a
    /// different type, or [`ConfigError::Store`] if the store refuses the
    /// variable outright.
    pub fn register(&mut self, def: VarDef, on_change: OnChange) -> Result<VarHandle, ConfigError> {
        let handle = match self.store.create(&def) {
            Ok(handle) => handle,
            Err(StoreError::AlreadyExists(_)) => {
                let (handle, existing) = self
                    .store
                    .find(&def.name)
                    .ok_or_else(|| StoreError::NotFound(def.name.clone()))?;
                if existing != def.var_type {
                    return Err(ConfigError::TypeMismatch {
                        name: def.name,
                        existing,
                        requested: def.var_type,
                    });
                }
                debug!("Reusing pre-existing variable {} ({})", def.name, handle);
                handle
            }
            Err(e) => return Err(e.into()),
        };

        if def.notify != NotifyKind::None {
            if let Err(e) = self.store.notify(handle, def.notify) {
                warn!("Failed to set up notification for '{}': {}", def.name, e);
            }
        }

        let value = match self.store.get(handle) {
            Ok(value) => value,
            Err(e) => {
                warn!("Cannot read initial value of '{}', caching zero: {}", def.name, e);
                VarValue::zero(def.var_type)
            }
        };
        self.vars.insert(
            handle,
            CachedVar {
                name: def.name,
                max_len: def.max_len,
                value,
                on_change,
            },
        );
        Ok(handle)
    }

    /// Cached value of a registered variable.
    pub fn get(&self, handle: VarHandle) -> Option<&VarValue> {
        self.vars.get(&handle).map(|var| &var.value)
    }

    /// Cached numeric value, or `0` if unregistered or not a number.
    pub fn get_u32(&self, handle: VarHandle) -> u32 {
        self.get(handle).and_then(VarValue::as_u32).unwrap_or(0)
    }

    /// Cached string value, or `""` if unregistered or not a string.
    pub fn get_str(&self, handle: VarHandle) -> &str {
        self.get(handle).and_then(VarValue::as_str).unwrap_or("")
    }

    /// Pulls the current value of a variable from the store into the cache.
    pub fn refresh(&mut self, handle: VarHandle) -> Result<&VarValue, StoreError> {
        let var = self
            .vars
            .get_mut(&handle)
            .ok_or_else(|| StoreError::NotFound(handle.to_string()))?;
        var.value = self.store.get(handle)?;
        Ok(&var.value)
    }

    /// Pushes a value to the store and, on success, into the cache.
    pub fn set(&mut self, handle: VarHandle, value: VarValue) -> Result<(), StoreError> {
        let var = self
            .vars
            .get_mut(&handle)
            .ok_or_else(|| StoreError::NotFound(handle.to_string()))?;
        if let VarValue::Str(s) = &value {
            if var.max_len > 0 && s.len() > var.max_len {
                return Err(StoreError::TooLong {
                    name: var.name.clone(),
                    max_len: var.max_len,
                });
            }
        }
        self.store.set(handle, value.clone())?;
        var.value = value;
        Ok(())
    }

    /// Dispatch entry for a handle, if it was registered here.
    pub fn on_change(&self, handle: VarHandle) -> Option<OnChange> {
        self.vars.get(&handle).map(|var| var.on_change)
    }

    pub fn name(&self, handle: VarHandle) -> Option<&str> {
        self.vars.get(&handle).map(|var| var.name.as_str())
    }

    /// The underlying external store.
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }
}
