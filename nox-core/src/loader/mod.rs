//! Guest module loading.
//!
//! Guests arrive as raw bytes from the command line or an embedder. They may be a
//! `.wasm` binary or `.wat` text, and the file name is not trusted, so the bytes
//! themselves are sniffed. WAT is converted with the `wat` crate before compiling.

use tracing::debug;
use wasmtime::{Engine, Module};

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The input was empty or otherwise not recognized as WASM/WAT.
    #[error("unrecognized guest format (expected wasm or wat)")]
    UnrecognizedFormat,

    #[error("failed to parse WAT: {0}")]
    WatParseFailed(#[from] wat::Error),

    #[error("failed to compile WASM module: {0}")]
    CompileFailed(anyhow::Error),
}

/// What kind of module the loader inferred from the bytes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DetectedFormat {
    Wasm,
    Wat,
}

/// Result of normalizing (detecting + possibly converting) the input.
#[derive(Clone, Debug)]
pub struct Detected {
    pub format: DetectedFormat,
    /// Always valid WASM bytes (for WASM/WAT inputs).
    pub wasm_bytes: Vec<u8>,
}

/// Detect, convert WAT if needed, and compile.
pub fn compile_module(engine: &Engine, bytes: &[u8]) -> Result<Module, LoadError> {
    let Detected { format, wasm_bytes } = normalize_to_wasm(bytes)?;
    debug!(?format, len = wasm_bytes.len(), "compiling guest module");
    Module::new(engine, &wasm_bytes).map_err(LoadError::CompileFailed)
}

/// Detect format and normalize to valid WASM bytes.
pub fn normalize_to_wasm(bytes: &[u8]) -> Result<Detected, LoadError> {
    let format = detect_format(bytes).ok_or(LoadError::UnrecognizedFormat)?;

    match format {
        DetectedFormat::Wasm => Ok(Detected {
            format,
            wasm_bytes: bytes.to_vec(),
        }),
        DetectedFormat::Wat => Ok(Detected {
            format,
            wasm_bytes: wat::parse_bytes(bytes)?.into_owned(),
        }),
    }
}

/// Best-effort detection.
///
/// - `\0asm` magic means WASM.
/// - Otherwise, after a UTF-8 BOM and leading whitespace, `(` means WAT.
pub fn detect_format(bytes: &[u8]) -> Option<DetectedFormat> {
    if bytes.len() >= 4 && bytes[0..4] == *b"\0asm" {
        return Some(DetectedFormat::Wasm);
    }

    let text = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match text.iter().find(|b| !b.is_ascii_whitespace()) {
        Some(b'(') => Some(DetectedFormat::Wat),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_wasm_magic() {
        assert_eq!(
            detect_format(b"\0asm\x01\x00\x00\x00"),
            Some(DetectedFormat::Wasm)
        );
    }

    #[test]
    fn detects_wat_with_whitespace() {
        assert_eq!(detect_format(b"   \n\t(module)"), Some(DetectedFormat::Wat));
    }

    #[test]
    fn detects_wat_with_bom() {
        assert_eq!(
            detect_format(b"\xEF\xBB\xBF(module)"),
            Some(DetectedFormat::Wat)
        );
    }

    #[test]
    fn unrecognized_returns_none() {
        assert_eq!(detect_format(b"not wasm"), None);
        assert_eq!(detect_format(b""), None);
        assert!(matches!(
            normalize_to_wasm(b"  "),
            Err(LoadError::UnrecognizedFormat)
        ));
    }

    #[test]
    fn wat_is_converted_and_compiles() {
        let detected = normalize_to_wasm(b"(module (func (export \"nox_update\") (param f32)))")
            .unwrap();
        assert_eq!(detected.format, DetectedFormat::Wat);
        assert_eq!(&detected.wasm_bytes[0..4], b"\0asm");

        let engine = Engine::default();
        assert!(compile_module(&engine, &detected.wasm_bytes).is_ok());
    }

    #[test]
    fn broken_wat_reports_parse_error() {
        assert!(matches!(
            normalize_to_wasm(b"(module (func"),
            Err(LoadError::WatParseFailed(_))
        ));
    }
}
