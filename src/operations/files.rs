//! File metadata.

use std::fs;
use std::path::Path;

use crate::error::OpError;
use crate::workflow::{OpIo, Operation, Schema, Value};

/// Reports the name, existence and size of a file path.
///
/// A missing file is not an error: `exists` is false and `size_bytes` is
/// `none`.
pub struct FileInfo;

impl Operation for FileInfo {
    fn schema(&self) -> Schema {
        Schema::new()
            .with_description("Reads basic metadata of a file path.")
            .required_input("path", "path to a file")
            .output("file_name", "final path component")
            .output("exists", "whether the path exists")
            .output("size_bytes", "file size in bytes")
    }

    fn run(&mut self, io: &mut OpIo) -> Result<(), OpError> {
        let path = Path::new(io.input_str("path")?).to_path_buf();

        let file_name = path
            .file_name()
            .map(|name| Value::Str(name.to_string_lossy().into_owned()))
            .unwrap_or_default();
        let size = match fs::metadata(&path) {
            Ok(meta) => Value::Int(i64::try_from(meta.len()).unwrap_or(i64::MAX)),
            Err(_) => Value::None,
        };

        io.set_output("file_name", file_name)?;
        io.set_output("exists", path.exists())?;
        io.set_output("size_bytes", size)
    }
}
