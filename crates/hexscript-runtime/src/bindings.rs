//! Script Global Objects
//!
//! Registers the `hex` global object, which exposes the [`Host`] capability
//! surface to scripts, and a `console` routed to the host log sinks.
//!
//! Callbacks handed to the host (views, menu items, providers) are stored in a
//! registry object on the context's globals and addressed by slot number.
//! Closures never capture JS values, so dropping the context frees them all.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use rquickjs::function::{Opt, Rest};
use rquickjs::{Coerced, Ctx, Exception, Function, Object, TypedArray, Value};

use crate::context::{ContextId, ContextKind};
use crate::host::{CallbackHandle, Host, LogLevel, ProviderRegistration, ToastSeverity};

/// Global holding retained callbacks, keyed by slot.
pub const CALLBACKS_KEY: &str = "__hexCallbacks";

const LOG_LEVELS: [(&str, LogLevel); 5] = [
    ("debug", LogLevel::Debug),
    ("info", LogLevel::Info),
    ("warn", LogLevel::Warn),
    ("error", LogLevel::Error),
    ("fatal", LogLevel::Fatal),
];

/// Register the `hex` and `console` globals for one context.
pub fn install<'js>(
    ctx: &Ctx<'js>,
    host: Arc<dyn Host>,
    context: ContextId,
    kind: ContextKind,
) -> rquickjs::Result<()> {
    let globals = ctx.globals();
    globals.set(CALLBACKS_KEY, Object::new(ctx.clone())?)?;

    let registrar = Registrar {
        context,
        kind,
        next_slot: Arc::new(AtomicU32::new(0)),
    };

    let hex = Object::new(ctx.clone())?;
    hex.set("memory", memory_object(ctx, &host)?)?;
    hex.set("bookmarks", bookmarks_object(ctx, &host)?)?;
    hex.set("log", log_object(ctx, &host)?)?;
    hex.set("ui", ui_object(ctx, &host, &registrar)?)?;
    hex.set("providers", providers_object(ctx, &host, &registrar)?)?;

    let print_host = host.clone();
    hex.set(
        "print",
        Function::new(ctx.clone(), move |args: Rest<Coerced<String>>| {
            print_host.print(&join(args));
        })?,
    )?;
    let println_host = host.clone();
    hex.set(
        "println",
        Function::new(ctx.clone(), move |args: Rest<Coerced<String>>| {
            println_host.println(&join(args));
        })?,
    )?;

    globals.set("hex", hex)?;
    register_console(ctx, &host)?;

    Ok(())
}

/// Fetch a retained callback by slot.
pub fn callback<'js>(ctx: &Ctx<'js>, slot: u32) -> rquickjs::Result<Option<Function<'js>>> {
    let callbacks: Object = ctx.globals().get(CALLBACKS_KEY)?;
    Ok(callbacks.get::<_, Value>(slot_key(slot))?.into_function())
}

/// Read a byte buffer passed by a script, either a `Uint8Array` or an array
/// of numbers.
pub fn bytes_from_js<'js>(ctx: &Ctx<'js>, value: Value<'js>) -> rquickjs::Result<Vec<u8>> {
    if let Some(array) = value.as_object().and_then(|o| o.as_typed_array::<u8>()) {
        return Ok(array.as_bytes().map(<[u8]>::to_vec).unwrap_or_default());
    }
    rquickjs::FromJs::from_js(ctx, value)
}

fn slot_key(slot: u32) -> String {
    slot.to_string()
}

fn join(args: Rest<Coerced<String>>) -> String {
    args.0
        .into_iter()
        .map(|Coerced(s)| s)
        .collect::<Vec<_>>()
        .join(" ")
}

// ─────────────────────────────────────────────────────────────────────────────
// Callback Retention
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
struct Registrar {
    context: ContextId,
    kind: ContextKind,
    next_slot: Arc<AtomicU32>,
}

impl Registrar {
    /// Store `function` in the callback registry. Only persistent contexts
    /// may retain callbacks; a transient one is gone before the host could
    /// call back.
    fn retain<'js>(
        &self,
        ctx: &Ctx<'js>,
        what: &str,
        function: Function<'js>,
    ) -> rquickjs::Result<CallbackHandle> {
        if !self.kind.is_persistent() {
            return Err(Exception::throw_message(
                ctx,
                &format!("{} can only be registered by a script loaded with LOAD", what),
            ));
        }

        let slot = self.next_slot.fetch_add(1, Ordering::Relaxed);
        let callbacks: Object = ctx.globals().get(CALLBACKS_KEY)?;
        callbacks.set(slot_key(slot), function)?;

        let handle = CallbackHandle {
            context: self.context,
            slot,
        };
        tracing::debug!("Retained {} callback {}", what, handle);
        Ok(handle)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Namespaces
// ─────────────────────────────────────────────────────────────────────────────

fn memory_object<'js>(ctx: &Ctx<'js>, host: &Arc<dyn Host>) -> rquickjs::Result<Object<'js>> {
    let memory = Object::new(ctx.clone())?;

    let read_host = host.clone();
    memory.set(
        "read",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, address: u64, size: u64| -> rquickjs::Result<TypedArray<'js, u8>> {
                TypedArray::new(ctx, read_host.read(address, size))
            },
        )?,
    )?;

    let write_host = host.clone();
    memory.set(
        "write",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, address: u64, bytes: Value<'js>| -> rquickjs::Result<()> {
                let bytes = bytes_from_js(&ctx, bytes)?;
                write_host.write(address, &bytes);
                Ok(())
            },
        )?,
    )?;

    let selection_host = host.clone();
    memory.set(
        "getSelection",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>| -> rquickjs::Result<Option<Object<'js>>> {
                let Some((start, end)) = selection_host.selection() else {
                    return Ok(None);
                };
                let selection = Object::new(ctx)?;
                selection.set("start", start)?;
                selection.set("end", end)?;
                Ok(Some(selection))
            },
        )?,
    )?;

    Ok(memory)
}

fn bookmarks_object<'js>(ctx: &Ctx<'js>, host: &Arc<dyn Host>) -> rquickjs::Result<Object<'js>> {
    let bookmarks = Object::new(ctx.clone())?;

    let host = host.clone();
    bookmarks.set(
        "create",
        Function::new(
            ctx.clone(),
            move |address: u64, size: u64, color: u32, name: String, description: Opt<String>| {
                host.create_bookmark(
                    address,
                    size,
                    color,
                    &name,
                    description.0.as_deref().unwrap_or_default(),
                );
            },
        )?,
    )?;

    Ok(bookmarks)
}

fn log_object<'js>(ctx: &Ctx<'js>, host: &Arc<dyn Host>) -> rquickjs::Result<Object<'js>> {
    let log = Object::new(ctx.clone())?;

    for (name, level) in LOG_LEVELS {
        let host = host.clone();
        log.set(
            name,
            Function::new(ctx.clone(), move |args: Rest<Coerced<String>>| {
                host.log(level, &join(args));
            })?,
        )?;
    }

    Ok(log)
}

fn ui_object<'js>(
    ctx: &Ctx<'js>,
    host: &Arc<dyn Host>,
    registrar: &Registrar,
) -> rquickjs::Result<Object<'js>> {
    let ui = Object::new(ctx.clone())?;

    let message_host = host.clone();
    ui.set(
        "showMessageBox",
        Function::new(ctx.clone(), move |message: Coerced<String>| {
            message_host.show_message_box(&message.0);
        })?,
    )?;

    let question_host = host.clone();
    ui.set(
        "showYesNoQuestion",
        Function::new(ctx.clone(), move |message: Coerced<String>| {
            question_host.show_yes_no_question(&message.0)
        })?,
    )?;

    let input_host = host.clone();
    ui.set(
        "showInputTextBox",
        Function::new(ctx.clone(), move |title: Coerced<String>, message: Opt<Coerced<String>>| {
            let message = message.0.map(|Coerced(m)| m).unwrap_or_default();
            input_host.show_input_text_box(&title.0, &message)
        })?,
    )?;

    let toast_host = host.clone();
    ui.set(
        "showToast",
        Function::new(ctx.clone(), move |message: Coerced<String>, severity: Opt<String>| {
            let severity = severity
                .0
                .as_deref()
                .map(ToastSeverity::from_name)
                .unwrap_or_default();
            toast_host.show_toast(&message.0, severity);
        })?,
    )?;

    let view_host = host.clone();
    let view_registrar = registrar.clone();
    ui.set(
        "registerView",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, icon: String, name: String, draw: Function<'js>| -> rquickjs::Result<()> {
                let handle = view_registrar.retain(&ctx, "A view", draw)?;
                view_host.register_view(&icon, &name, handle);
                Ok(())
            },
        )?,
    )?;

    let menu_host = host.clone();
    let menu_registrar = registrar.clone();
    ui.set(
        "addMenuItem",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>,
                  icon: String,
                  menu: String,
                  item: String,
                  callback: Function<'js>|
                  -> rquickjs::Result<()> {
                let handle = menu_registrar.retain(&ctx, "A menu item", callback)?;
                menu_host.add_menu_item(&icon, &menu, &item, handle);
                Ok(())
            },
        )?,
    )?;

    Ok(ui)
}

fn providers_object<'js>(
    ctx: &Ctx<'js>,
    host: &Arc<dyn Host>,
    registrar: &Registrar,
) -> rquickjs::Result<Object<'js>> {
    let providers = Object::new(ctx.clone())?;

    let host = host.clone();
    let registrar = registrar.clone();
    providers.set(
        "register",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>,
                  type_name: String,
                  name: String,
                  read: Function<'js>,
                  write: Function<'js>,
                  size: Function<'js>|
                  -> rquickjs::Result<()> {
                let provider = ProviderRegistration {
                    read: registrar.retain(&ctx, "A provider", read)?,
                    write: registrar.retain(&ctx, "A provider", write)?,
                    size: registrar.retain(&ctx, "A provider", size)?,
                    type_name,
                    name,
                };
                tracing::info!("Script registered provider '{}' ({})", provider.name, provider.type_name);
                host.register_provider(provider);
                Ok(())
            },
        )?,
    )?;

    Ok(providers)
}

/// Replace `console` with one that writes to the host log sinks.
fn register_console<'js>(ctx: &Ctx<'js>, host: &Arc<dyn Host>) -> rquickjs::Result<()> {
    let console = Object::new(ctx.clone())?;

    let console_levels = [
        ("log", LogLevel::Info),
        ("info", LogLevel::Info),
        ("debug", LogLevel::Debug),
        ("warn", LogLevel::Warn),
        ("error", LogLevel::Error),
    ];
    for (name, level) in console_levels {
        let host = host.clone();
        console.set(
            name,
            Function::new(ctx.clone(), move |args: Rest<Coerced<String>>| {
                host.log(level, &join(args));
            })?,
        )?;
    }

    ctx.globals().set("console", console)?;
    Ok(())
}
