//! Console Host
//!
//! A [`Host`] for running scripts outside an editor: memory is an in-memory
//! buffer, UI prompts are answered automatically and everything a script
//! registers is recorded so the CLI can report it.

use std::fs;
use std::io;
use std::path::Path;

use parking_lot::Mutex;
use serde::Serialize;

use hexscript_runtime::{
    CallbackHandle, Host, ProviderRegistration, ScriptLoader, ScriptResult, ToastSeverity,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bookmark {
    pub address: u64,
    pub size: u64,
    pub color: u32,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewRecord {
    pub icon: String,
    pub name: String,
    pub handle: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MenuItemRecord {
    pub icon: String,
    pub menu: String,
    pub item: String,
    pub handle: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderRecord {
    pub type_name: String,
    pub name: String,
}

/// Everything scripts registered with a [`ConsoleHost`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct Registrations {
    pub bookmarks: Vec<Bookmark>,
    pub views: Vec<ViewRecord>,
    pub menu_items: Vec<MenuItemRecord>,
    pub providers: Vec<ProviderRecord>,
}

#[derive(Default)]
pub struct ConsoleHost {
    memory: Mutex<Vec<u8>>,
    selection: Mutex<Option<(u64, u64)>>,
    answer: bool,
    registrations: Mutex<Registrations>,
    callbacks: Mutex<Vec<CallbackHandle>>,
    providers: Mutex<Vec<ProviderRegistration>>,
}

impl ConsoleHost {
    pub fn new(memory: Vec<u8>) -> Self {
        Self {
            memory: Mutex::new(memory),
            ..Default::default()
        }
    }

    /// Back memory with the contents of `path`.
    pub fn from_file(path: &Path) -> io::Result<Self> {
        let data = fs::read(path)?;
        tracing::debug!("Loaded {} bytes from {}", data.len(), path.display());
        Ok(Self::new(data))
    }

    /// Answer to every yes/no question.
    pub fn with_answer(mut self, answer: bool) -> Self {
        self.answer = answer;
        self
    }

    pub fn set_selection(&self, selection: Option<(u64, u64)>) {
        *self.selection.lock() = selection;
    }

    pub fn memory(&self) -> Vec<u8> {
        self.memory.lock().clone()
    }

    pub fn registrations(&self) -> Registrations {
        self.registrations.lock().clone()
    }

    /// View and menu-item callbacks, in registration order.
    pub fn callbacks(&self) -> Vec<CallbackHandle> {
        self.callbacks.lock().clone()
    }

    pub fn providers(&self) -> Vec<ProviderRegistration> {
        self.providers.lock().clone()
    }

    /// Call every registered view and menu-item callback once, in
    /// registration order.
    pub fn invoke_callbacks(&self, loader: &ScriptLoader) -> Vec<(CallbackHandle, ScriptResult<()>)> {
        self.callbacks()
            .into_iter()
            .map(|handle| (handle, loader.invoke_callback(handle)))
            .collect()
    }

    /// Read the whole content of every registered provider.
    pub fn read_providers(&self, loader: &ScriptLoader) -> Vec<(String, ScriptResult<Vec<u8>>)> {
        self.providers()
            .into_iter()
            .map(|provider| {
                let bytes = loader
                    .provider_size(provider.size)
                    .and_then(|size| loader.provider_read(provider.read, 0, size));
                (provider.name, bytes)
            })
            .collect()
    }
}

/// Parse a `START:END` selection; both bounds accept a `0x` prefix.
pub fn parse_selection(text: &str) -> Result<(u64, u64), String> {
    let (start, end) = text
        .split_once(':')
        .ok_or_else(|| format!("expected START:END, got '{text}'"))?;
    let start = parse_address(start)?;
    let end = parse_address(end)?;
    if end < start {
        return Err(format!("selection end {end:#x} is before start {start:#x}"));
    }
    Ok((start, end))
}

fn parse_address(text: &str) -> Result<u64, String> {
    let text = text.trim();
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|e| format!("invalid address '{text}': {e}"))
}

impl Host for ConsoleHost {
    fn read(&self, address: u64, size: u64) -> Vec<u8> {
        let memory = self.memory.lock();
        let start = usize::try_from(address).unwrap_or(usize::MAX).min(memory.len());
        let end = usize::try_from(address.saturating_add(size))
            .unwrap_or(usize::MAX)
            .min(memory.len());
        memory[start..end].to_vec()
    }

    fn write(&self, address: u64, bytes: &[u8]) {
        let mut memory = self.memory.lock();
        let Ok(start) = usize::try_from(address) else {
            return;
        };
        if start >= memory.len() {
            tracing::warn!("Write past end of data at {:#x}", address);
            return;
        }
        let end = (start + bytes.len()).min(memory.len());
        memory[start..end].copy_from_slice(&bytes[..end - start]);
    }

    fn selection(&self) -> Option<(u64, u64)> {
        *self.selection.lock()
    }

    fn create_bookmark(&self, address: u64, size: u64, color_argb: u32, name: &str, description: &str) {
        tracing::info!("Bookmark '{}' at {:#x}+{}", name, address, size);
        self.registrations.lock().bookmarks.push(Bookmark {
            address,
            size,
            color: color_argb,
            name: name.to_string(),
            description: description.to_string(),
        });
    }

    fn print(&self, text: &str) {
        print!("{text}");
    }

    fn println(&self, text: &str) {
        println!("{text}");
    }

    fn show_message_box(&self, message: &str) {
        tracing::info!(target: "hexscript.script", "[message] {}", message);
    }

    fn show_yes_no_question(&self, message: &str) -> bool {
        tracing::info!(target: "hexscript.script", "[question] {} -> {}", message, self.answer);
        self.answer
    }

    fn show_input_text_box(&self, title: &str, message: &str) -> Option<String> {
        tracing::info!(target: "hexscript.script", "[input] {}: {} -> cancelled", title, message);
        None
    }

    fn show_toast(&self, message: &str, severity: ToastSeverity) {
        match severity {
            ToastSeverity::Info => tracing::info!(target: "hexscript.script", "[toast] {}", message),
            ToastSeverity::Warning => tracing::warn!(target: "hexscript.script", "[toast] {}", message),
            ToastSeverity::Error => tracing::error!(target: "hexscript.script", "[toast] {}", message),
        }
    }

    fn register_view(&self, icon: &str, name: &str, draw: CallbackHandle) {
        tracing::info!("Registered view '{}' ({})", name, draw);
        self.callbacks.lock().push(draw);
        self.registrations.lock().views.push(ViewRecord {
            icon: icon.to_string(),
            name: name.to_string(),
            handle: draw.to_string(),
        });
    }

    fn add_menu_item(&self, icon: &str, menu: &str, item: &str, callback: CallbackHandle) {
        tracing::info!("Registered menu item '{}/{}' ({})", menu, item, callback);
        self.callbacks.lock().push(callback);
        self.registrations.lock().menu_items.push(MenuItemRecord {
            icon: icon.to_string(),
            menu: menu.to_string(),
            item: item.to_string(),
            handle: callback.to_string(),
        });
    }

    fn register_provider(&self, provider: ProviderRegistration) {
        tracing::info!("Registered provider '{}' ({})", provider.name, provider.type_name);
        self.registrations.lock().providers.push(ProviderRecord {
            type_name: provider.type_name.clone(),
            name: provider.name.clone(),
        });
        self.providers.lock().push(provider);
    }
}
