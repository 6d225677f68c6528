//! C ABI
//!
//! Hosts written in other languages drive a process-wide [`ScriptLoader`]
//! through the `hexscript_*` symbols:
//!
//! ```text
//! hexscript_init(config_toml, len, host)       install the loader
//! hexscript_execute("LOAD||OnLoad||/s/Main.js") run a wire command
//! hexscript_invoke_callback(context, slot)      call a view / menu item
//! hexscript_provider_{size,read,write}(...)     call a data provider
//! hexscript_shutdown()                          unload everything
//! ```
//!
//! Every symbol returns a result code. Host table functions run while the
//! loader is locked and must not call back into `hexscript_*`. Rust embedders may install a loader
//! directly with [`install_global_loader`] instead of `hexscript_init`.

use std::ffi::c_void;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::LoaderConfig;
use crate::context::ContextId;
use crate::error::{ResultCode, ScriptResult};
use crate::host::{CallbackHandle, Host, LogLevel, NullHost, ProviderRegistration};
use crate::loader::ScriptLoader;

static GLOBAL_LOADER: Mutex<Option<ScriptLoader>> = Mutex::new(None);

/// Largest single memory or provider transfer across the C boundary.
const MAX_TRANSFER: u64 = 1 << 24;

/// Install the process-wide loader, returning the previous one.
pub fn install_global_loader(loader: ScriptLoader) -> Option<ScriptLoader> {
    GLOBAL_LOADER.lock().replace(loader)
}

/// Remove the process-wide loader, unloading every persistent script.
pub fn uninstall_global_loader() -> Option<ScriptLoader> {
    GLOBAL_LOADER.lock().take()
}

/// Run `f` on the process-wide loader. One call is in flight at a time;
/// concurrent callers block. A panic is reported as `LoaderError`.
fn with_global_loader<F>(what: &str, f: F) -> i32
where
    F: FnOnce(&mut ScriptLoader) -> i32,
{
    let mut guard = GLOBAL_LOADER.lock();
    let Some(loader) = guard.as_mut() else {
        tracing::error!("No script loader installed");
        return ResultCode::LoaderError.as_i32();
    };

    match panic::catch_unwind(AssertUnwindSafe(|| f(loader))) {
        Ok(result) => result,
        Err(_) => {
            tracing::error!("Script loader panicked during {}", what);
            ResultCode::LoaderError.as_i32()
        }
    }
}

fn code_of<T>(result: &ScriptResult<T>) -> i32 {
    match result {
        Ok(_) => ResultCode::Success.as_i32(),
        Err(err) => {
            tracing::error!("{}", err);
            err.code().as_i32()
        }
    }
}

/// Run a wire command on the process-wide loader.
pub fn execute_global(wire: &str) -> i32 {
    with_global_loader(wire, |loader| loader.execute(wire))
}

/// Borrow `length` bytes at `ptr` as UTF-8. A null pointer with length 0 is
/// the empty string.
///
/// # Safety
///
/// `ptr` must point to `length` readable bytes, or be null.
unsafe fn str_arg<'a>(ptr: *const u8, length: i32) -> Option<&'a str> {
    let length = usize::try_from(length).ok()?;
    if ptr.is_null() {
        return (length == 0).then_some("");
    }
    // SAFETY: the caller guarantees `ptr` points to `length` bytes.
    let bytes = unsafe { std::slice::from_raw_parts(ptr, length) };
    match std::str::from_utf8(bytes) {
        Ok(text) => Some(text),
        Err(err) => {
            tracing::error!("Argument is not valid UTF-8: {}", err);
            None
        }
    }
}

fn handle(context: u64, slot: u32) -> CallbackHandle {
    CallbackHandle {
        context: ContextId::from_raw(context),
        slot,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// C Host
// ─────────────────────────────────────────────────────────────────────────────

/// `(user_data, address, buffer, size) -> bytes written to buffer`
pub type HostReadFn = unsafe extern "C" fn(*mut c_void, u64, *mut u8, u64) -> u64;
/// `(user_data, address, bytes, length)`
pub type HostWriteFn = unsafe extern "C" fn(*mut c_void, u64, *const u8, u64);
/// `(user_data, level, message, length)`; levels are 0 debug to 4 fatal.
pub type HostLogFn = unsafe extern "C" fn(*mut c_void, i32, *const u8, u64);
/// `(user_data, kind, name, length, context, slot)`; kind 0 is a view, 1 a
/// menu item named `menu/item`.
pub type HostCallbackFn = unsafe extern "C" fn(*mut c_void, i32, *const u8, u64, u64, u32);
/// `(user_data, name, length, context, read_slot, write_slot, size_slot)`
pub type HostProviderFn = unsafe extern "C" fn(*mut c_void, *const u8, u64, u64, u32, u32, u32);

pub const CALLBACK_VIEW: i32 = 0;
pub const CALLBACK_MENU_ITEM: i32 = 1;

/// Function table of a host written in C. Absent entries fall back to the
/// defaults of [`Host`].
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct HostVTable {
    pub user_data: *mut c_void,
    pub read: Option<HostReadFn>,
    pub write: Option<HostWriteFn>,
    pub log: Option<HostLogFn>,
    pub register_callback: Option<HostCallbackFn>,
    pub register_provider: Option<HostProviderFn>,
}

struct CHost {
    vtable: HostVTable,
}

// SAFETY: `hexscript_init` requires the table and its user data to be usable
// from whichever thread drives the loader.
unsafe impl Send for CHost {}
unsafe impl Sync for CHost {}

impl Host for CHost {
    fn read(&self, address: u64, size: u64) -> Vec<u8> {
        let Some(read) = self.vtable.read else {
            return Vec::new();
        };
        let mut buffer = vec![0u8; size.min(MAX_TRANSFER) as usize];
        // SAFETY: the buffer holds `buffer.len()` writable bytes.
        let written = unsafe {
            read(
                self.vtable.user_data,
                address,
                buffer.as_mut_ptr(),
                buffer.len() as u64,
            )
        };
        buffer.truncate(written.min(buffer.len() as u64) as usize);
        buffer
    }

    fn write(&self, address: u64, bytes: &[u8]) {
        if let Some(write) = self.vtable.write {
            // SAFETY: `bytes` is valid for the duration of the call.
            unsafe { write(self.vtable.user_data, address, bytes.as_ptr(), bytes.len() as u64) }
        }
    }

    fn log(&self, level: LogLevel, message: &str) {
        let Some(log) = self.vtable.log else {
            return NullHost.log(level, message);
        };
        let level = match level {
            LogLevel::Debug => 0,
            LogLevel::Info => 1,
            LogLevel::Warn => 2,
            LogLevel::Error => 3,
            LogLevel::Fatal => 4,
        };
        // SAFETY: `message` is valid for the duration of the call.
        unsafe { log(self.vtable.user_data, level, message.as_ptr(), message.len() as u64) }
    }

    fn register_view(&self, _icon: &str, name: &str, draw: CallbackHandle) {
        self.register_callback(CALLBACK_VIEW, name, draw);
    }

    fn add_menu_item(&self, _icon: &str, menu: &str, item: &str, callback: CallbackHandle) {
        self.register_callback(CALLBACK_MENU_ITEM, &format!("{menu}/{item}"), callback);
    }

    fn register_provider(&self, provider: ProviderRegistration) {
        let Some(register) = self.vtable.register_provider else {
            return NullHost.register_provider(provider);
        };
        // SAFETY: `provider.name` is valid for the duration of the call.
        unsafe {
            register(
                self.vtable.user_data,
                provider.name.as_ptr(),
                provider.name.len() as u64,
                provider.read.context.as_u64(),
                provider.read.slot,
                provider.write.slot,
                provider.size.slot,
            )
        }
    }
}

impl CHost {
    fn register_callback(&self, kind: i32, name: &str, handle: CallbackHandle) {
        let Some(register) = self.vtable.register_callback else {
            tracing::debug!("Host takes no callbacks, ignoring '{}' ({})", name, handle);
            return;
        };
        // SAFETY: `name` is valid for the duration of the call.
        unsafe {
            register(
                self.vtable.user_data,
                kind,
                name.as_ptr(),
                name.len() as u64,
                handle.context.as_u64(),
                handle.slot,
            )
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Exported Symbols
// ─────────────────────────────────────────────────────────────────────────────

/// Install the process-wide loader.
///
/// `config` is a TOML [`LoaderConfig`] table; null or empty selects the
/// defaults. A null `host` installs a host that ignores every call.
///
/// # Safety
///
/// `config` must point to `length` readable bytes, or be null. `host`, when
/// not null, must point to a valid [`HostVTable`] whose functions and user
/// data stay usable from any thread until `hexscript_shutdown`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hexscript_init(config: *const u8, length: i32, host: *const HostVTable) -> i32 {
    // SAFETY: forwarded caller guarantee.
    let Some(source) = (unsafe { str_arg(config, length) }) else {
        return ResultCode::LoaderError.as_i32();
    };
    let config: LoaderConfig = match toml::from_str(source) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!("Invalid loader configuration: {}", err);
            return ResultCode::LoaderError.as_i32();
        }
    };

    let host: Arc<dyn Host> = if host.is_null() {
        Arc::new(NullHost)
    } else {
        // SAFETY: non-null and valid per the caller's guarantee.
        Arc::new(CHost {
            vtable: unsafe { *host },
        })
    };

    if install_global_loader(ScriptLoader::new(config, host)).is_some() {
        tracing::info!("Replaced the installed script loader");
    }
    ResultCode::Success.as_i32()
}

/// Drop the process-wide loader and every persistently loaded script.
#[unsafe(no_mangle)]
pub extern "C" fn hexscript_shutdown() -> i32 {
    match uninstall_global_loader() {
        Some(_) => ResultCode::Success.as_i32(),
        None => ResultCode::LoaderError.as_i32(),
    }
}

/// Execute a `"<KIND>||<METHOD>||<PATH>"` command.
///
/// # Safety
///
/// `argument` must point to `length` readable bytes, or be null.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hexscript_execute(argument: *const u8, length: i32) -> i32 {
    if argument.is_null() {
        return ResultCode::LoaderError.as_i32();
    }
    // SAFETY: forwarded caller guarantee.
    match unsafe { str_arg(argument, length) } {
        Some(wire) => execute_global(wire),
        None => ResultCode::LoaderError.as_i32(),
    }
}

/// Call a retained view or menu-item callback.
#[unsafe(no_mangle)]
pub extern "C" fn hexscript_invoke_callback(context: u64, slot: u32) -> i32 {
    with_global_loader("invoke_callback", |loader| {
        code_of(&loader.invoke_callback(handle(context, slot)))
    })
}

/// Ask a provider for its size.
///
/// # Safety
///
/// `size` must be a valid pointer to a `u64`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hexscript_provider_size(context: u64, slot: u32, size: *mut u64) -> i32 {
    if size.is_null() {
        return ResultCode::LoaderError.as_i32();
    }
    with_global_loader("provider_size", |loader| {
        let result = loader.provider_size(handle(context, slot));
        if let Ok(value) = &result {
            // SAFETY: checked non-null; the caller guarantees validity.
            unsafe { *size = *value };
        }
        code_of(&result)
    })
}

/// Read up to `capacity` bytes at `offset` from a provider into `buffer`.
/// The number of bytes stored is written to `read`.
///
/// # Safety
///
/// `buffer` must point to `capacity` writable bytes and `read` to a `u64`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hexscript_provider_read(
    context: u64,
    slot: u32,
    offset: u64,
    buffer: *mut u8,
    capacity: u64,
    read: *mut u64,
) -> i32 {
    if buffer.is_null() || read.is_null() {
        return ResultCode::LoaderError.as_i32();
    }
    let capacity = capacity.min(MAX_TRANSFER);
    with_global_loader("provider_read", |loader| {
        let result = loader.provider_read(handle(context, slot), offset, capacity);
        if let Ok(bytes) = &result {
            let count = bytes.len().min(capacity as usize);
            // SAFETY: `count <= capacity` bytes fit in `buffer`; both
            // pointers were checked non-null.
            unsafe {
                std::ptr::copy_nonoverlapping(bytes.as_ptr(), buffer, count);
                *read = count as u64;
            }
        }
        code_of(&result)
    })
}

/// Write `length` bytes to a provider at `offset`.
///
/// # Safety
///
/// `bytes` must point to `length` readable bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hexscript_provider_write(
    context: u64,
    slot: u32,
    offset: u64,
    bytes: *const u8,
    length: u64,
) -> i32 {
    if bytes.is_null() || length > MAX_TRANSFER {
        return ResultCode::LoaderError.as_i32();
    }
    // SAFETY: the caller guarantees `bytes` points to `length` bytes.
    let bytes = unsafe { std::slice::from_raw_parts(bytes, length as usize) };
    with_global_loader("provider_write", |loader| {
        code_of(&loader.provider_write(handle(context, slot), offset, bytes))
    })
}
