//! Conversions between UTF-16 "wide" text and UTF-8.
//!
//! Both directions measure the exact output length first and allocate once.
//! Ill-formed input (unpaired surrogates, invalid UTF-8) is replaced with
//! U+FFFD, the same substitution the Windows converters make with default
//! flags, so only well-formed text round-trips unchanged.

use std::ffi::OsStr;

use thiserror::Error;

/// Inputs must be strictly shorter than this many code units.
pub const MAX_CONVERT_LEN: usize = i32::MAX as usize;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TextError {
    #[error("length overflow: {len} code units")]
    LengthOverflow { len: usize },

    #[error("native string is not valid UTF-8: {lossy}")]
    InvalidNative { lossy: String },
}

pub fn check_len(len: usize) -> Result<(), TextError> {
    if len >= MAX_CONVERT_LEN {
        return Err(TextError::LengthOverflow { len });
    }
    Ok(())
}

pub fn to_utf8(wide: &[u16]) -> Result<String, TextError> {
    check_len(wide.len())?;

    let len = decode_wide(wide).map(char::len_utf8).sum();
    let mut out = String::with_capacity(len);
    out.extend(decode_wide(wide));
    debug_assert_eq!(out.len(), len);
    Ok(out)
}

pub fn to_wide(utf8: &[u8]) -> Result<Vec<u16>, TextError> {
    check_len(utf8.len())?;

    let text = String::from_utf8_lossy(utf8);
    let len = text.encode_utf16().count();
    let mut out = Vec::with_capacity(len);
    out.extend(text.encode_utf16());
    debug_assert_eq!(out.len(), len);
    Ok(out)
}

fn decode_wide(wide: &[u16]) -> impl Iterator<Item = char> + '_ {
    char::decode_utf16(wide.iter().copied()).map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
}

/// Turns the host's native string representation into UTF-8.
pub trait NativeText {
    fn to_utf8(native: &OsStr) -> Result<String, TextError>;
}

/// Hosts whose native strings are UTF-16 (Windows).
#[cfg(windows)]
pub struct WideText;

#[cfg(windows)]
impl NativeText for WideText {
    fn to_utf8(native: &OsStr) -> Result<String, TextError> {
        use std::os::windows::ffi::OsStrExt;

        let wide: Vec<u16> = native.encode_wide().collect();
        to_utf8(&wide)
    }
}

/// Hosts whose native strings are byte strings expected to hold UTF-8.
pub struct ByteText;

impl NativeText for ByteText {
    fn to_utf8(native: &OsStr) -> Result<String, TextError> {
        check_len(native.len())?;
        native
            .to_str()
            .map(str::to_owned)
            .ok_or_else(|| TextError::InvalidNative {
                lossy: native.to_string_lossy().into_owned(),
            })
    }
}

#[cfg(windows)]
pub type PlatformText = WideText;
#[cfg(not(windows))]
pub type PlatformText = ByteText;

pub fn native_to_utf8(native: &OsStr) -> Result<String, TextError> {
    PlatformText::to_utf8(native)
}
