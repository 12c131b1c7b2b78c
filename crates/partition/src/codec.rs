//! Binary codec for partition nodes.
//!
//! ```text
//! [type_len: u16]["merkle-db/partition"]
//! [limit: u64][count: u64]
//! [first_key_len: u32][first_key][last_key_len: u32][last_key]
//! [family_count: u32]
//!   per family: [name_len: u16][name][field_count: u32]
//!     per field: [field_len: u16][field]
//! [membership filter bytes]
//! [tablet_count: u32]
//!   per tablet: [family_len: u16][family][target: 32 bytes]
//! ```
//!
//! All integers little-endian. Maps are written in key order and the
//! membership filter serializes deterministically, so structurally equal
//! nodes encode to identical bytes and share one content address. The
//! decoder rejects payloads whose type tag differs from
//! [`PARTITION_TYPE`]; tablet payloads carry their own per-entry CRCs.

use bloom::MembershipFilter;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use record::Families;
use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use store::{Link, NodeId};

use crate::{Partition, PartitionError, Result};

/// Logical type tag carried by every partition node payload.
pub const PARTITION_TYPE: &str = "merkle-db/partition";

/// Serializes a partition node into its canonical byte form.
pub fn encode_node(node: &Partition) -> Result<Vec<u8>> {
    let mut out = Vec::new();

    out.write_u16::<LittleEndian>(PARTITION_TYPE.len() as u16)?;
    out.write_all(PARTITION_TYPE.as_bytes())?;

    out.write_u64::<LittleEndian>(node.limit as u64)?;
    out.write_u64::<LittleEndian>(node.count as u64)?;

    write_bytes(&mut out, &node.first_key)?;
    write_bytes(&mut out, &node.last_key)?;

    let families: Vec<_> = node.families.iter().collect();
    out.write_u32::<LittleEndian>(families.len() as u32)?;
    for (name, fields) in families {
        write_str(&mut out, name)?;
        out.write_u32::<LittleEndian>(fields.len() as u32)?;
        for field in fields {
            write_str(&mut out, field)?;
        }
    }

    node.membership.write_to(&mut out)?;

    out.write_u32::<LittleEndian>(node.tablets.len() as u32)?;
    for (family, link) in &node.tablets {
        write_str(&mut out, family)?;
        out.write_all(link.target.as_bytes())?;
    }

    Ok(out)
}

/// Deserializes a partition node, verifying the type tag and field schema.
pub fn decode_node(bytes: &[u8]) -> Result<Partition> {
    let mut r = Cursor::new(bytes);

    let tag = read_str(&mut r)?;
    if tag != PARTITION_TYPE {
        return Err(PartitionError::CorruptNode("unexpected node type tag"));
    }

    let limit = r.read_u64::<LittleEndian>()? as usize;
    let count = r.read_u64::<LittleEndian>()? as usize;
    if limit == 0 {
        return Err(PartitionError::CorruptNode("zero partition limit"));
    }

    let first_key = read_bytes(&mut r)?;
    let last_key = read_bytes(&mut r)?;
    if first_key > last_key {
        return Err(PartitionError::CorruptNode("inverted key bounds"));
    }

    let family_count = r.read_u32::<LittleEndian>()?;
    let mut family_fields: Vec<(String, Vec<String>)> = Vec::with_capacity(family_count as usize);
    let mut seen_fields = std::collections::BTreeSet::new();
    for _ in 0..family_count {
        let name = read_str(&mut r)?;
        if name == record::BASE_FAMILY {
            return Err(PartitionError::CorruptNode("reserved family name in layout"));
        }
        let field_count = r.read_u32::<LittleEndian>()?;
        let mut fields = Vec::with_capacity(field_count as usize);
        for _ in 0..field_count {
            let field = read_str(&mut r)?;
            if !seen_fields.insert(field.clone()) {
                return Err(PartitionError::CorruptNode("field claimed twice in layout"));
            }
            fields.push(field);
        }
        family_fields.push((name, fields));
    }
    let families = Families::new(family_fields);

    let membership = MembershipFilter::read_from(&mut r)?;

    let tablet_count = r.read_u32::<LittleEndian>()?;
    let mut tablets = BTreeMap::new();
    for _ in 0..tablet_count {
        let family = read_str(&mut r)?;
        let mut hash = [0u8; 32];
        r.read_exact(&mut hash)?;
        tablets.insert(family.clone(), Link::new(family, NodeId::from_bytes(hash)));
    }

    Ok(Partition {
        limit,
        tablets,
        membership,
        count,
        families,
        first_key,
        last_key,
    })
}

fn write_bytes(w: &mut Vec<u8>, bytes: &[u8]) -> Result<()> {
    w.write_u32::<LittleEndian>(bytes.len() as u32)?;
    w.write_all(bytes)?;
    Ok(())
}

fn read_bytes(r: &mut Cursor<&[u8]>) -> Result<Vec<u8>> {
    let len = r.read_u32::<LittleEndian>()?;
    if len > 64 * 1024 {
        return Err(PartitionError::CorruptNode("implausible key length"));
    }
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

fn write_str(w: &mut Vec<u8>, s: &str) -> Result<()> {
    w.write_u16::<LittleEndian>(s.len() as u16)?;
    w.write_all(s.as_bytes())?;
    Ok(())
}

fn read_str(r: &mut Cursor<&[u8]>) -> Result<String> {
    let len = r.read_u16::<LittleEndian>()?;
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|_| PartitionError::CorruptNode("name not utf-8"))
}
