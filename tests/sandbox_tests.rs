//! End-to-end tests of the Lua sandbox: configuration, host functions,
//! script modules, output capture and concurrent construction.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use lua_whitelist_sandbox_rs::prelude::*;
use mlua::{IntoLuaMulti, MultiValue, Value};

/// Helper to create a config with captured output and a small whitelist.
fn test_config() -> SandboxConfig {
    let registry = WhitelistRegistry::builder()
        .globals(["print", "pairs", "tostring"])
        .module("math", ["floor", "sin", "cos"])
        .module("string", ["format"])
        .build()
        .unwrap();

    SandboxConfig::builder()
        .registry(registry)
        .capture_output(true)
        .build()
}

fn geometry() -> HostFunction {
    HostFunction::new("get_geometry", |lua, _args: MultiValue| {
        (640, 480).into_lua_multi(lua)
    })
}

#[test]
fn test_print_is_captured() {
    let sandbox = LuaSandbox::new(test_config()).unwrap();
    sandbox
        .exec(r#"print("hello", 1); print(string.format("%d-%s", 7, "x"))"#, "printer")
        .unwrap();

    let output = sandbox.output().unwrap();
    assert_eq!(output.to_string_lossy(), "hello\t1\n7-x\n");
}

#[test]
fn test_output_not_captured_by_default() {
    let sandbox = LuaSandbox::new(SandboxConfig::default()).unwrap();
    assert!(sandbox.output().is_none());
}

#[test]
fn test_host_function_installed() {
    let config = SandboxConfig::builder()
        .registry(WhitelistRegistry::builder().bare("print").build().unwrap())
        .function(geometry())
        .build();
    let sandbox = LuaSandbox::new(config).unwrap();

    let (width, height): (i64, i64) = sandbox.eval("return get_geometry()", "geometry").unwrap();
    assert_eq!((width, height), (640, 480));
}

#[test]
fn test_with_functions() {
    let scale = HostFunction::new("scale", |lua, args: MultiValue| {
        let factor = args.iter().next().and_then(|v| v.as_f64()).unwrap_or(1.0);
        (factor * 2.0).into_lua_multi(lua)
    });
    let sandbox = LuaSandbox::with_functions(test_config(), [geometry(), scale]).unwrap();

    let (width, doubled): (i64, f64) = sandbox
        .eval("local w = get_geometry(); return w, scale(1.5)", "functions")
        .unwrap();
    assert_eq!(width, 640);
    assert_eq!(doubled, 3.0);
}

#[test]
fn test_host_function_collides_with_whitelist() {
    let counter = Arc::new(AtomicUsize::new(0));
    let opened = Arc::clone(&counter);
    let registry = WhitelistRegistry::builder()
        .native("voxsdl", ["pollEvent"])
        .bare("print")
        .build()
        .unwrap();

    let config = SandboxConfig::builder()
        .registry(registry)
        .native_module(NativeModule::new("voxsdl", move |lua| {
            opened.fetch_add(1, Ordering::SeqCst);
            let module = lua.create_table()?;
            module.set("pollEvent", lua.create_function(|_, ()| Ok(()))?)?;
            Ok(module)
        }))
        .function(HostFunction::new("print", |_, args| Ok(args)))
        .build();

    let err = LuaSandbox::new(config).err().unwrap();
    assert!(matches!(
        err,
        EnvError::DuplicateBinding { ref name, scope: None } if name == "print"
    ));
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[test]
fn test_native_module_through_sandbox() {
    let registry = WhitelistRegistry::builder()
        .native("voxsdl", ["scancode"])
        .build()
        .unwrap();
    let config = SandboxConfig::builder()
        .registry(registry)
        .native_module(
            NativeModule::new("voxsdl", |lua| {
                let module = lua.create_table()?;
                module.set("scancode", lua.create_function(|_, key: String| Ok(key.len()))?)?;
                module.set("quit", lua.create_function(|_, ()| Ok(()))?)?;
                Ok(module)
            })
            .disable(["quit"]),
        )
        .build();

    let sandbox = LuaSandbox::new(config).unwrap();
    let code: i64 = sandbox.eval(r#"return voxsdl.scancode("space")"#, "keys").unwrap();
    assert_eq!(code, 5);

    let hidden: bool = sandbox.eval("return voxsdl.quit == nil", "keys").unwrap();
    assert!(hidden);
}

#[test]
fn test_native_module_not_allowed() {
    let registry = WhitelistRegistry::builder()
        .native("netio", ["connect"])
        .build()
        .unwrap();
    let config = SandboxConfig::builder()
        .registry(registry)
        .native_module(NativeModule::new("netio", |lua| lua.create_table()))
        .native_module(NativeModule::new("voxsdl", |lua| lua.create_table()))
        .allow_native("voxsdl")
        .build();

    let err = LuaSandbox::new(config).err().unwrap();
    assert!(err.is_restricted_load());
    assert_eq!(err.entry().as_deref(), Some("netio"));
}

#[test]
fn test_script_module_and_args() {
    let dir = tempfile::tempdir().unwrap();
    let mut file = std::fs::File::create(dir.path().join("voxutils.lua")).unwrap();
    writeln!(
        file,
        r#"
local utils = {{}}
function utils.double(x) return x * 2 end
-- evaluated in the full environment
utils.trusted = io ~= nil
return utils
"#
    )
    .unwrap();

    let config = SandboxConfig::builder()
        .registry(WhitelistRegistry::builder().bare("print").build().unwrap())
        .module_path(dir.path())
        .script_module("voxutils")
        .args(["scene.lua", "--fast"])
        .build();
    let sandbox = LuaSandbox::new(config).unwrap();

    let (doubled, trusted, first, count): (i64, bool, String, i64) = sandbox
        .eval(
            "return voxutils.double(21), voxutils.trusted, arg[1], #arg",
            "modules",
        )
        .unwrap();
    assert_eq!(doubled, 42);
    assert!(trusted);
    assert_eq!(first, "scene.lua");
    assert_eq!(count, 2);

    let io_hidden: bool = sandbox.eval("return io == nil", "modules").unwrap();
    assert!(io_hidden);
}

#[test]
fn test_missing_script_module() {
    let dir = tempfile::tempdir().unwrap();
    let config = SandboxConfig::builder()
        .module_path(dir.path())
        .script_module("absent")
        .build();

    let err = LuaSandbox::new(config).err().unwrap();
    assert!(matches!(err, EnvError::ScriptModule { ref module, .. } if module == "absent"));
}

#[test]
fn test_script_module_must_return_table() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("answer.lua"), "return 42").unwrap();
    let config = SandboxConfig::builder()
        .module_path(dir.path())
        .script_module("answer")
        .build();

    let err = LuaSandbox::new(config).err().unwrap();
    assert!(err.to_string().contains("instead of a table"));
}

#[test]
fn test_init_and_tick_with_protected_world() {
    let sandbox = LuaSandbox::new(test_config()).unwrap();
    sandbox
        .exec(
            r#"
function init()
    return { tree = "oak", camera = "simple" }
end

function tick(world, time)
    print(world.tree, time)
    world.camera = "hijacked"
    return true
end
"#,
            "scene",
        )
        .unwrap();

    let world: mlua::Table = sandbox.call("init", ()).unwrap();
    let proxy = sandbox.protect(world.clone()).unwrap();

    let err = sandbox.call::<bool>("tick", (proxy, 16)).unwrap_err();
    assert!(matches!(err, EnvError::ScriptRuntime { ref chunk, .. } if chunk == "tick"));
    assert!(err.to_string().contains("write protected"));
    assert_eq!(world.get::<String>("camera").unwrap(), "simple");
    assert_eq!(sandbox.output().unwrap().take(), "oak\t16\n");
}

#[test]
fn test_exec_file() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("scene.lua");
    std::fs::write(&script, "result = math.floor(9.5)").unwrap();

    let sandbox = LuaSandbox::new(test_config()).unwrap();
    sandbox.exec_file(&script).unwrap();

    let result: i64 = sandbox.environment().get("result").unwrap();
    assert_eq!(result, 9);
}

#[test]
fn test_exec_file_accepts_non_utf8_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("latin1.lua");
    std::fs::write(&script, b"name = \"caf\xe9\"\n").unwrap();

    let sandbox = LuaSandbox::new(test_config()).unwrap();
    sandbox.exec_file(&script).unwrap();

    let name: mlua::String = sandbox.environment().get("name").unwrap();
    assert_eq!(name.as_bytes().to_vec(), b"caf\xe9".to_vec());
}

#[test]
fn test_script_module_accepts_non_utf8_bytes() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("labels.lua"),
        b"return { greeting = \"gr\xfc\xdf\" }\n",
    )
    .unwrap();
    let config = SandboxConfig::builder()
        .registry(WhitelistRegistry::builder().bare("print").build().unwrap())
        .module_path(dir.path())
        .script_module("labels")
        .build();
    let sandbox = LuaSandbox::new(config).unwrap();

    let length: i64 = sandbox.eval("return #labels.greeting", "labels").unwrap();
    assert_eq!(length, 4);
}

/// A native module built like `voxtrees`: trusted, installed whole.
fn voxtrees() -> NativeModule {
    NativeModule::new("voxtrees", |lua| {
        let module = lua.create_table()?;
        module.set("grow", lua.create_function(|_, height: i64| Ok(height * 2))?)?;
        module.set("prune", lua.create_function(|_, ()| Ok(true))?)?;
        Ok(module)
    })
}

#[test]
fn test_trusted_native_module_installed_whole() {
    let config = SandboxConfig::builder()
        .registry(WhitelistRegistry::builder().bare("print").build().unwrap())
        .trusted_native_module(voxtrees())
        .allow_native("voxsdl")
        .build();
    let sandbox = LuaSandbox::new(config).unwrap();

    let (grown, pruned): (i64, bool) = sandbox
        .eval("return voxtrees.grow(4), voxtrees.prune()", "trees")
        .unwrap();
    assert_eq!((grown, pruned), (8, true));

    let leaked: bool = sandbox
        .lua()
        .load("return voxtrees ~= nil or package.loaded.voxtrees ~= nil")
        .eval()
        .unwrap();
    assert!(!leaked);
}

#[test]
fn test_trusted_native_module_respects_disabled_entries() {
    let config = SandboxConfig::builder()
        .registry(WhitelistRegistry::builder().bare("print").build().unwrap())
        .trusted_native_module(voxtrees().disable(["prune"]))
        .build();
    let sandbox = LuaSandbox::new(config).unwrap();

    let hidden: bool = sandbox.eval("return voxtrees.prune == nil", "trees").unwrap();
    assert!(hidden);
}

#[test]
fn test_trusted_native_module_collides_with_whitelist() {
    let counter = Arc::new(AtomicUsize::new(0));
    let opened = Arc::clone(&counter);
    let config = SandboxConfig::builder()
        .registry(
            WhitelistRegistry::builder()
                .native("voxtrees", ["grow"])
                .build()
                .unwrap(),
        )
        .trusted_native_module(NativeModule::new("voxtrees", move |lua| {
            opened.fetch_add(1, Ordering::SeqCst);
            lua.create_table()
        }))
        .build();

    let err = LuaSandbox::new(config).err().unwrap();
    assert!(matches!(
        err,
        EnvError::DuplicateBinding { ref name, scope: None } if name == "voxtrees"
    ));
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[test]
fn test_trusted_native_module_collides_with_host_function() {
    let config = SandboxConfig::builder()
        .trusted_native_module(voxtrees())
        .function(HostFunction::new("voxtrees", |_, args| Ok(args)))
        .build();

    assert!(matches!(
        LuaSandbox::new(config),
        Err(EnvError::DuplicateBinding { ref name, .. }) if name == "voxtrees"
    ));
}

#[test]
fn test_policy_file_drives_sandbox() {
    let dir = tempfile::tempdir().unwrap();
    let policy = dir.path().join("whitelist.toml");
    std::fs::write(
        &policy,
        r#"
[[entry]]
kind = "bare"
name = "tostring"

[[entry]]
kind = "module"
module = "math"
names = ["max"]
"#,
    )
    .unwrap();

    let registry = WhitelistRegistry::from_path(&policy).unwrap();
    let sandbox = LuaSandbox::new(SandboxConfig::builder().registry(registry).build()).unwrap();

    let largest: String = sandbox.eval("return tostring(math.max(3, 8))", "policy").unwrap();
    assert_eq!(largest, "8");

    let err = sandbox.exec("print(1)", "policy").unwrap_err();
    assert!(matches!(err, EnvError::ScriptRuntime { .. }));
}

#[test]
fn test_policy_file_missing() {
    let dir = tempfile::tempdir().unwrap();
    let err = WhitelistRegistry::from_path(dir.path().join("none.toml")).unwrap_err();
    assert!(matches!(err, EnvError::Io(_)));
}

/// Sandboxes are built independently on several threads from one shared
/// configuration; each state opens the native module exactly once.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sandboxes() {
    let opened = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&opened);
    let registry = WhitelistRegistry::standard()
        .merge(
            &WhitelistRegistry::builder()
                .native("voxsdl", ["pollEvent"])
                .build()
                .unwrap(),
        )
        .unwrap();
    let config = Arc::new(
        SandboxConfig::builder()
            .registry(registry)
            .native_module(NativeModule::new("voxsdl", move |lua| {
                counter.fetch_add(1, Ordering::SeqCst);
                let module = lua.create_table()?;
                module.set("pollEvent", lua.create_function(|_, ()| Ok(Value::Nil))?)?;
                Ok(module)
            }))
            .build(),
    );

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let config = Arc::clone(&config);
            tokio::task::spawn_blocking(move || {
                let sandbox = LuaSandbox::new((*config).clone())?;
                sandbox.eval::<i64>(&format!("return math.floor({}.5)", i), "worker")
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let value = handle.await.unwrap().unwrap();
        assert_eq!(value, i as i64);
    }
    assert_eq!(opened.load(Ordering::SeqCst), 8);
}
