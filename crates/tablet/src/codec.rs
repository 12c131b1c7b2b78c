//! Binary codec for persisted tablets.
//!
//! ```text
//! [magic: u32 "TBL1"][entry_count: u32]
//! per entry:
//!   [crc32: u32][key_len: u32][key][field_count: u32]
//!   per field: [name_len: u16][name][val_len: u32][value]
//! ```
//!
//! All integers are little-endian. The CRC32 covers everything after itself
//! in the entry (key_len through the last value byte) and detects silent
//! corruption before a bad tablet reaches the merge path. The decoder also
//! requires strictly ascending keys; a violation means the blob was not
//! produced by this codec and is rejected as corrupt.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use record::{Fragment, Key};
use std::io::{Cursor, Read, Write};

use crate::{Tablet, TabletError};

/// Magic identifying tablet payloads ("TBL1").
pub const TABLET_MAGIC: u32 = 0x5442_4C31;

// Per-field and per-key length caps; anything larger is a decode bug.
const MAX_KEY_LEN: u32 = 64 * 1024;
const MAX_VALUE_LEN: u32 = 16 * 1024 * 1024;

/// Serializes a tablet into its canonical byte form.
///
/// The encoding is deterministic: entries are written in key order and
/// fragment fields in field-name order, so equal tablets produce equal bytes
/// and therefore equal content addresses.
pub fn encode(tablet: &Tablet) -> Result<Vec<u8>, TabletError> {
    let mut out = Vec::new();
    out.write_u32::<LittleEndian>(TABLET_MAGIC)?;
    out.write_u32::<LittleEndian>(tablet.len() as u32)?;

    let mut body = Vec::new();
    for (key, fragment) in tablet.read_all() {
        body.clear();
        write_entry(&mut body, key, fragment)?;

        let crc = crc32fast::hash(&body);
        out.write_u32::<LittleEndian>(crc)?;
        out.write_all(&body)?;
    }
    Ok(out)
}

/// Deserializes a tablet, verifying magic, per-entry CRCs, and key order.
pub fn decode(bytes: &[u8]) -> Result<Tablet, TabletError> {
    let mut r = Cursor::new(bytes);

    if r.read_u32::<LittleEndian>()? != TABLET_MAGIC {
        return Err(TabletError::Corrupt("bad tablet magic"));
    }
    let count = r.read_u32::<LittleEndian>()?;

    let mut entries: Vec<(Key, Fragment)> = Vec::with_capacity(count as usize);
    let mut prev_key: Option<Key> = None;
    for _ in 0..count {
        let expected_crc = r.read_u32::<LittleEndian>()?;
        let start = r.position() as usize;
        let (key, fragment) = read_entry(&mut r)?;
        let end = r.position() as usize;

        if crc32fast::hash(&bytes[start..end]) != expected_crc {
            return Err(TabletError::Corrupt("entry crc mismatch"));
        }
        if let Some(prev) = &prev_key {
            if !record::key::before(prev, &key) {
                return Err(TabletError::Corrupt("tablet keys out of order"));
            }
        }
        prev_key = Some(key.clone());
        entries.push((key, fragment));
    }

    Ok(Tablet::from_records(entries))
}

fn write_entry(w: &mut Vec<u8>, key: &[u8], fragment: &Fragment) -> Result<(), TabletError> {
    w.write_u32::<LittleEndian>(key.len() as u32)?;
    w.write_all(key)?;
    w.write_u32::<LittleEndian>(fragment.len() as u32)?;
    for (name, value) in fragment {
        w.write_u16::<LittleEndian>(name.len() as u16)?;
        w.write_all(name.as_bytes())?;
        w.write_u32::<LittleEndian>(value.len() as u32)?;
        w.write_all(value)?;
    }
    Ok(())
}

fn read_entry(r: &mut Cursor<&[u8]>) -> Result<(Key, Fragment), TabletError> {
    let key_len = r.read_u32::<LittleEndian>()?;
    if key_len > MAX_KEY_LEN {
        return Err(TabletError::Corrupt("implausible key length"));
    }
    let mut key = vec![0u8; key_len as usize];
    r.read_exact(&mut key)?;

    let field_count = r.read_u32::<LittleEndian>()?;
    let mut fragment = Fragment::new();
    for _ in 0..field_count {
        let name_len = r.read_u16::<LittleEndian>()?;
        let mut name = vec![0u8; name_len as usize];
        r.read_exact(&mut name)?;
        let name =
            String::from_utf8(name).map_err(|_| TabletError::Corrupt("field name not utf-8"))?;

        let val_len = r.read_u32::<LittleEndian>()?;
        if val_len > MAX_VALUE_LEN {
            return Err(TabletError::Corrupt("implausible value length"));
        }
        let mut value = vec![0u8; val_len as usize];
        r.read_exact(&mut value)?;
        fragment.insert(name, value);
    }
    Ok((key, fragment))
}
