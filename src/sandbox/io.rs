//! Output capture for sandboxed scripts.

use std::io::Write;
use std::sync::{Arc, Mutex};

use mlua::{Function, Lua, MultiValue};

/// A writer that captures output to a buffer.
#[derive(Clone, Debug)]
pub struct CapturedOutput {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl CapturedOutput {
    /// Create a new captured output buffer.
    pub fn new() -> Self {
        Self {
            buffer: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Get the captured output as a string.
    pub fn to_string_lossy(&self) -> String {
        let buffer = self.buffer.lock().unwrap();
        String::from_utf8_lossy(&buffer).to_string()
    }

    /// Take the captured output, leaving the buffer empty.
    pub fn take(&self) -> String {
        let mut buffer = self.buffer.lock().unwrap();
        let taken = std::mem::take(&mut *buffer);
        String::from_utf8_lossy(&taken).to_string()
    }

    /// Clear the buffer.
    pub fn clear(&self) {
        let mut buffer = self.buffer.lock().unwrap();
        buffer.clear();
    }

    /// Get the length of captured data.
    pub fn len(&self) -> usize {
        let buffer = self.buffer.lock().unwrap();
        buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CapturedOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl Write for CapturedOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut buffer = self.buffer.lock().unwrap();
        buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Build a `print` that behaves like Lua's but writes into `output`.
///
/// Arguments are converted with the state's `tostring`, separated by tabs
/// and terminated by a newline.
pub fn capturing_print(lua: &Lua, output: CapturedOutput) -> mlua::Result<Function> {
    let tostring: Function = lua.globals().raw_get("tostring")?;
    lua.create_function(move |_, args: MultiValue| {
        let mut line = String::new();
        for (i, value) in args.into_iter().enumerate() {
            if i > 0 {
                line.push('\t');
            }
            line.push_str(&tostring.call::<mlua::String>(value)?.to_string_lossy());
        }
        line.push('\n');
        let mut out = output.clone();
        out.write_all(line.as_bytes()).map_err(mlua::Error::external)?;
        Ok(())
    })
}
