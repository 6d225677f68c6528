//! Entry-point resolution.

use rquickjs::{Coerced, Ctx, Filter, Function, Object, Value};

use crate::config::{EntryPointPolicy, LoaderConfig};
use crate::error::{ScriptError, ScriptResult};

/// The unique script unit of a primary module.
///
/// Borrowed from its context; it cannot outlive the invocation that
/// resolved it.
#[derive(Debug, Clone)]
pub struct ScriptEntryPoint<'js> {
    name: String,
    unit: Object<'js>,
}

impl<'js> ScriptEntryPoint<'js> {
    /// Export name of the unit.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit(&self) -> &Object<'js> {
        &self.unit
    }

    /// Look up a function-valued property by exact name.
    ///
    /// Members the unit inherits from script-defined ancestors count; the
    /// engine's `Function.prototype` and `Object.prototype` members do not.
    pub fn method(&self, name: &str) -> ScriptResult<Option<Function<'js>>> {
        if name.is_empty() {
            return Ok(None);
        }

        let builtins = builtin_prototypes(self.unit.ctx())?;
        let mut current = Some(self.unit.clone());
        while let Some(object) = current {
            if builtins.iter().any(|b| b.as_value() == object.as_value()) {
                break;
            }
            if has_own_key(&object, name)? {
                return Ok(object.get::<_, Value>(name)?.into_function());
            }
            current = object.get_prototype();
        }
        Ok(None)
    }

    pub fn has_method(&self, name: &str) -> ScriptResult<bool> {
        Ok(self.method(name)?.is_some())
    }
}

/// Find the entry unit among the exports of `namespace`.
///
/// `support` is the namespace of the support module. Its own marker export
/// (the base every script unit extends) is never a candidate, even when the
/// primary re-exports it.
///
/// Zero or several candidates is an error; there is no first-match fallback.
pub fn resolve<'js>(
    namespace: &Object<'js>,
    support: Option<&Object<'js>>,
    config: &LoaderConfig,
) -> ScriptResult<ScriptEntryPoint<'js>> {
    match config.entry_point {
        EntryPointPolicy::Name => {
            let unit = namespace
                .get::<_, Value>(config.entry_name.as_str())?
                .into_object()
                .ok_or_else(|| {
                    ScriptError::Resolution(format!("no export named '{}'", config.entry_name))
                })?;
            Ok(ScriptEntryPoint {
                name: config.entry_name.clone(),
                unit,
            })
        }
        EntryPointPolicy::Marker => {
            let marker_root = match support {
                Some(support) => Some(support.get::<_, Value>(config.marker.as_str())?),
                None => None,
            }
            .filter(|root| root.is_object());

            let mut candidates = Vec::new();
            for prop in namespace.props::<String, Value>() {
                let (name, value) = prop?;
                if marker_root.as_ref() == Some(&value) {
                    continue;
                }
                let Some(unit) = value.into_object() else {
                    continue;
                };
                if has_marker(&unit, &config.marker)? {
                    candidates.push(ScriptEntryPoint { name, unit });
                }
            }

            match candidates.len() {
                0 => Err(ScriptError::Resolution(format!(
                    "no export carries the '{}' marker",
                    config.marker
                ))),
                1 => Ok(candidates.remove(0)),
                _ => {
                    let names: Vec<&str> = candidates.iter().map(|c| c.name.as_str()).collect();
                    Err(ScriptError::Resolution(format!(
                        "multiple exports carry the '{}' marker: {}",
                        config.marker,
                        names.join(", ")
                    )))
                }
            }
        }
    }
}

fn builtin_prototypes<'js>(ctx: &Ctx<'js>) -> ScriptResult<[Object<'js>; 2]> {
    let globals = ctx.globals();
    let function: Object = globals.get::<_, Object>("Function")?.get("prototype")?;
    let object: Object = globals.get::<_, Object>("Object")?.get("prototype")?;
    Ok([function, object])
}

fn has_own_key(object: &Object<'_>, name: &str) -> ScriptResult<bool> {
    for key in object.own_keys::<String>(Filter::new().string()) {
        if key? == name {
            return Ok(true);
        }
    }
    Ok(false)
}

fn has_marker(unit: &Object<'_>, marker: &str) -> ScriptResult<bool> {
    let Coerced(flag) = unit.get::<_, Coerced<bool>>(marker)?;
    Ok(flag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rquickjs::{Context, Module, Runtime};

    fn with_namespace<R>(source: &str, f: impl FnOnce(&Object<'_>) -> R) -> R {
        let runtime = Runtime::new().unwrap();
        let context = Context::full(&runtime).unwrap();
        context.with(|ctx| {
            ctx.globals()
                .set("IScript", ctx.eval::<Value, _>("(class IScript { static IScript = true; })").unwrap())
                .unwrap();
            let (module, promise) = Module::declare(ctx.clone(), "script", source)
                .unwrap()
                .eval()
                .unwrap();
            promise.finish::<()>().unwrap();
            let namespace = module.namespace().unwrap();
            f(&namespace)
        })
    }

    #[test]
    fn test_marker_single() {
        let source = r#"
            export class Hello extends IScript { static Run() { return 1; } }
            export const helper = { Run() {} };
            export const version = 3;
        "#;
        with_namespace(source, |ns| {
            let entry = resolve(ns, None, &LoaderConfig::default()).unwrap();
            assert_eq!(entry.name(), "Hello");
            assert!(entry.has_method("Run").unwrap());
            assert!(!entry.has_method("Stop").unwrap());
            assert!(!entry.has_method("").unwrap());
        });
    }

    #[test]
    fn test_marker_plain_object() {
        with_namespace("export const Script = { IScript: true, Main() {} };", |ns| {
            let entry = resolve(ns, None, &LoaderConfig::default()).unwrap();
            assert_eq!(entry.name(), "Script");
        });
    }

    #[test]
    fn test_marker_none() {
        with_namespace("export class Hello { static Run() {} }", |ns| {
            let err = resolve(ns, None, &LoaderConfig::default()).unwrap_err();
            assert!(matches!(err, ScriptError::Resolution(_)));
        });
    }

    #[test]
    fn test_marker_ambiguous() {
        let source = r#"
            export class A extends IScript {}
            export class B extends IScript {}
        "#;
        with_namespace(source, |ns| {
            let err = resolve(ns, None, &LoaderConfig::default()).unwrap_err();
            match err {
                ScriptError::Resolution(message) => {
                    assert!(message.contains("A") && message.contains("B"));
                }
                other => panic!("unexpected error: {other}"),
            }
        });
    }

    #[test]
    fn test_name_policy() {
        let config = LoaderConfig::default().with_entry_point(EntryPointPolicy::Name);
        with_namespace("export const Script = { Main() { return 0; } };", |ns| {
            let entry = resolve(ns, None, &config).unwrap();
            assert_eq!(entry.name(), "Script");
            assert!(entry.has_method("Main").unwrap());
        });
        with_namespace("export const NotScript = {};", |ns| {
            assert!(matches!(resolve(ns, None, &config), Err(ScriptError::Resolution(_))));
        });
    }

    #[test]
    fn test_inherited_methods() {
        let source = r#"
            class Base extends IScript { static Shared() { return 7; } }
            export class Child extends Base {}
        "#;
        with_namespace(source, |ns| {
            let entry = resolve(ns, None, &LoaderConfig::default()).unwrap();
            assert_eq!(entry.name(), "Child");
            assert!(entry.has_method("Shared").unwrap());
        });
    }

    #[test]
    fn test_builtins_are_not_methods() {
        with_namespace("export class S extends IScript { static Run() {} }", |ns| {
            let entry = resolve(ns, None, &LoaderConfig::default()).unwrap();
            for name in ["toString", "call", "apply", "bind", "hasOwnProperty", "constructor", "valueOf"] {
                assert!(!entry.has_method(name).unwrap(), "{name} should not be a script method");
            }
            assert!(entry.has_method("Run").unwrap());
        });
    }

    #[test]
    fn test_own_override_of_builtin_name() {
        with_namespace(
            "export class S extends IScript { static toString() { return 'S'; } }",
            |ns| {
                let entry = resolve(ns, None, &LoaderConfig::default()).unwrap();
                assert!(entry.has_method("toString").unwrap());
            },
        );
    }

    #[test]
    fn test_reexported_marker_root_is_skipped() {
        let runtime = Runtime::new().unwrap();
        let context = Context::full(&runtime).unwrap();
        context.with(|ctx| {
            let (library, promise) = Module::declare(
                ctx.clone(),
                "ImHexLibrary",
                "export class IScript { static IScript = true; }",
            )
            .unwrap()
            .eval()
            .unwrap();
            promise.finish::<()>().unwrap();
            let support = library.namespace().unwrap();
            let base: Value = support.get("IScript").unwrap();
            ctx.globals().set("LibraryIScript", base).unwrap();

            let (module, promise) = Module::declare(
                ctx.clone(),
                "script",
                "const IScript = LibraryIScript; export { IScript }; export class Hello extends IScript { static Run() {} }",
            )
            .unwrap()
            .eval()
            .unwrap();
            promise.finish::<()>().unwrap();
            let namespace = module.namespace().unwrap();

            let entry = resolve(&namespace, Some(&support), &LoaderConfig::default()).unwrap();
            assert_eq!(entry.name(), "Hello");

            let err = resolve(&namespace, None, &LoaderConfig::default()).unwrap_err();
            assert!(matches!(err, ScriptError::Resolution(_)));
        });
    }
}
