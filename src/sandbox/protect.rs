//! Write-protected views of Lua tables.

use mlua::{Function, Lua, Table, Value};

/// Wrap `table` in a read-only proxy.
///
/// Reads, `#` and `pairs` go through to `table`; any assignment raises an
/// error. The proxy's metatable is locked, so `getmetatable` and
/// `setmetatable` cannot be used to get at the original.
pub fn write_protect(lua: &Lua, table: Table) -> mlua::Result<Table> {
    let proxy = lua.create_table()?;
    let meta = lua.create_table()?;

    meta.raw_set("__index", table.clone())?;
    meta.raw_set(
        "__newindex",
        lua.create_function(|_, (proxy, _key, _value): (Table, Value, Value)| {
            Err::<(), _>(mlua::Error::runtime(format!(
                "table {:p} is write protected",
                proxy.to_pointer()
            )))
        })?,
    )?;

    let len_source = table.clone();
    meta.raw_set(
        "__len",
        lua.create_function(move |_, _: Table| Ok(len_source.raw_len()))?,
    )?;

    let next: Function = lua.globals().raw_get("next")?;
    meta.raw_set(
        "__pairs",
        lua.create_function(move |_, _: Table| Ok((next.clone(), table.clone(), Value::Nil)))?,
    )?;

    meta.raw_set("__metatable", false)?;
    proxy.set_metatable(Some(meta));

    Ok(proxy)
}
