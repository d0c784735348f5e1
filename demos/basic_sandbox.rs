//! Basic example of running a script in a whitelisted Lua environment.
//!
//! Run with: cargo run --example basic_sandbox

use lua_whitelist_sandbox_rs::prelude::*;
use mlua::{IntoLuaMulti, MultiValue};

fn main() -> Result<()> {
    // Standard safe set plus a native input module with two entry points
    let input = WhitelistRegistry::builder()
        .native("voxsdl", ["pollEvent", "getKeyboardState"])
        .build()?;
    let registry = WhitelistRegistry::standard().merge(&input)?;

    let config = SandboxConfig::builder()
        .registry(registry)
        .native_module(
            NativeModule::new("voxsdl", |lua| {
                let module = lua.create_table()?;
                module.set("pollEvent", lua.create_function(|_, ()| Ok(mlua::Nil))?)?;
                module.set("getKeyboardState", lua.create_function(|lua, ()| lua.create_table())?)?;
                module.set("warpMouse", lua.create_function(|_, (_x, _y): (i64, i64)| Ok(()))?)?;
                Ok(module)
            })
            .disable(["warpMouse"]),
        )
        .function(HostFunction::new("get_geometry", |lua, _args: MultiValue| {
            (800, 600).into_lua_multi(lua)
        }))
        .args(["demo"])
        .capture_output(true)
        .build();

    println!("Creating sandbox with config: {:?}", config);

    let sandbox = match LuaSandbox::new(config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to create sandbox: {}", e);
            if let Some(entry) = e.entry() {
                eprintln!("Offending whitelist entry: {}", entry);
            }
            return Err(e);
        }
    };

    println!("\n=== Test 1: Whitelisted functions ===");
    sandbox.exec(
        r#"
local w, h = get_geometry()
print(string.format("%s running at %dx%d", arg[1], w, h))
print("sin(pi/2) =", math.sin(math.pi / 2))
"#,
        "demo",
    )?;
    if let Some(output) = sandbox.output() {
        print!("{}", output.take());
    }

    println!("\n=== Test 2: Capabilities that are not whitelisted ===");
    for attempt in ["io.open('/etc/passwd')", "os.execute('ls')", "require('socket')"] {
        match sandbox.exec(attempt, "attempt") {
            Ok(()) => println!("{:<28} -> unexpectedly succeeded", attempt),
            Err(e) => println!("{:<28} -> {}", attempt, e),
        }
    }

    println!("\n=== Test 3: Script-defined entry points ===");
    sandbox.exec(
        r#"
function init() return { frames = 0 } end
function tick(world, time)
    print("tick at", time, "frames so far", world.frames)
    return time < 100
end
"#,
        "scene",
    )?;
    let world: mlua::Table = sandbox.call("init", ())?;
    let world = sandbox.protect(world)?;
    let keep_running: bool = sandbox.call("tick", (world, 16))?;
    if let Some(output) = sandbox.output() {
        print!("{}", output.take());
    }
    println!("keep running: {}", keep_running);

    Ok(())
}
