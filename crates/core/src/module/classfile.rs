//! Reading and writing of `module-info.class` files

use super::descriptor::{ModuleDescriptor, RequiresModifier};
use crate::error::{Error, Result};
use std::collections::HashMap;

const MAGIC: u32 = 0xCAFE_BABE;
const MAJOR_VERSION: u16 = 53;

const ACC_MODULE: u16 = 0x8000;
const ACC_OPEN: u16 = 0x0020;
const ACC_TRANSITIVE: u16 = 0x0020;
const ACC_STATIC_PHASE: u16 = 0x0040;
const ACC_SYNTHETIC: u16 = 0x1000;
const ACC_MANDATED: u16 = 0x8000;

const CONSTANT_UTF8: u8 = 1;
const CONSTANT_CLASS: u8 = 7;
const CONSTANT_MODULE: u8 = 19;
const CONSTANT_PACKAGE: u8 = 20;

/// Emit a minimal `module-info.class` carrying the module's name, flags,
/// version, requires and exports. Counts and strings must fit the
/// classfile's 16-bit fields.
pub fn module_info_bytes(descriptor: &ModuleDescriptor) -> Result<Vec<u8>> {
    let mut pool = ConstantPoolWriter::default();
    let this_class = pool.class("module-info")?;
    let attribute_name = pool.utf8("Module")?;
    let module_name = pool.module(descriptor.name())?;
    let version = match descriptor.version() {
        Some(version) => pool.utf8(version)?,
        None => 0,
    };

    let mut attribute = Vec::new();
    put_u2(&mut attribute, module_name);
    put_u2(
        &mut attribute,
        if descriptor.is_open() { ACC_OPEN } else { 0 },
    );
    put_u2(&mut attribute, version);

    put_u2(&mut attribute, u2_len("requires", descriptor.requires().len())?);
    for (module, modifiers) in descriptor.requires() {
        put_u2(&mut attribute, pool.module(module)?);
        let flags = modifiers.iter().fold(0, |flags, modifier| {
            flags
                | match modifier {
                    RequiresModifier::Transitive => ACC_TRANSITIVE,
                    RequiresModifier::Static => ACC_STATIC_PHASE,
                    RequiresModifier::Synthetic => ACC_SYNTHETIC,
                    RequiresModifier::Mandated => ACC_MANDATED,
                }
        });
        put_u2(&mut attribute, flags);
        put_u2(&mut attribute, 0);
    }

    put_u2(&mut attribute, u2_len("exports", descriptor.exports().len())?);
    for (package, targets) in descriptor.exports() {
        put_u2(&mut attribute, pool.package(package)?);
        put_u2(&mut attribute, 0);
        put_u2(&mut attribute, u2_len("export targets", targets.len())?);
        for target in targets {
            put_u2(&mut attribute, pool.module(target)?);
        }
    }

    // opens, uses, provides
    put_u2(&mut attribute, 0);
    put_u2(&mut attribute, 0);
    put_u2(&mut attribute, 0);

    let mut out = Vec::new();
    out.extend_from_slice(&MAGIC.to_be_bytes());
    put_u2(&mut out, 0);
    put_u2(&mut out, MAJOR_VERSION);
    put_u2(&mut out, pool.count);
    out.extend_from_slice(&pool.bytes);
    put_u2(&mut out, ACC_MODULE);
    put_u2(&mut out, this_class);
    // super class, interfaces, fields, methods
    put_u2(&mut out, 0);
    put_u2(&mut out, 0);
    put_u2(&mut out, 0);
    put_u2(&mut out, 0);
    put_u2(&mut out, 1);
    put_u2(&mut out, attribute_name);
    let attribute_len = u32::try_from(attribute.len())
        .map_err(|_| Error::ClassFormat("Module attribute too large".to_string()))?;
    out.extend_from_slice(&attribute_len.to_be_bytes());
    out.extend_from_slice(&attribute);
    Ok(out)
}

/// A length or count as a classfile `u2`
fn u2_len(what: &str, len: usize) -> Result<u16> {
    u16::try_from(len)
        .map_err(|_| Error::ClassFormat(format!("too many {what}: {len} exceeds {}", u16::MAX)))
}

/// Parse a `module-info.class` file into a descriptor
pub fn parse_module_info(bytes: &[u8]) -> Result<ModuleDescriptor> {
    let mut reader = Reader::new(bytes);
    if reader.u4()? != MAGIC {
        return Err(Error::ClassFormat("bad magic number".to_string()));
    }
    reader.u2()?;
    reader.u2()?;
    let pool = ConstantPool::read(&mut reader)?;

    let access_flags = reader.u2()?;
    if access_flags & ACC_MODULE == 0 {
        return Err(Error::ClassFormat("class is not a module descriptor".to_string()));
    }
    reader.u2()?;
    reader.u2()?;
    let interfaces = reader.u2()?;
    reader.skip(interfaces as usize * 2)?;
    for _ in 0..2 {
        // fields, then methods
        let members = reader.u2()?;
        for _ in 0..members {
            reader.skip(6)?;
            skip_attributes(&mut reader)?;
        }
    }

    let mut descriptor = None;
    let mut packages = Vec::new();
    let mut main_class = None;
    let attributes = reader.u2()?;
    for _ in 0..attributes {
        let name = pool.utf8(reader.u2()?)?;
        let length = reader.u4()? as usize;
        let mut body = Reader::new(reader.take(length)?);
        match name {
            "Module" => descriptor = Some(read_module_attribute(&mut body, &pool)?),
            "ModulePackages" => {
                let count = body.u2()?;
                for _ in 0..count {
                    packages.push(pool.package(body.u2()?)?);
                }
            }
            "ModuleMainClass" => main_class = Some(pool.class(body.u2()?)?),
            _ => {}
        }
    }

    let mut descriptor = descriptor
        .ok_or_else(|| Error::ClassFormat("missing Module attribute".to_string()))?
        .with_packages(packages);
    if let Some(main_class) = main_class {
        descriptor = descriptor.with_main_class(main_class);
    }
    Ok(descriptor)
}

fn read_module_attribute(body: &mut Reader<'_>, pool: &ConstantPool) -> Result<ModuleDescriptor> {
    let name = pool.module(body.u2()?)?;
    let flags = body.u2()?;
    let version = body.u2()?;

    let mut descriptor = ModuleDescriptor::new(name).with_open(flags & ACC_OPEN != 0);
    if version != 0 {
        descriptor = descriptor.with_version(pool.utf8(version)?);
    }

    let requires = body.u2()?;
    for _ in 0..requires {
        let module = pool.module(body.u2()?)?;
        let flags = body.u2()?;
        body.u2()?;
        let modifiers = [
            (ACC_TRANSITIVE, RequiresModifier::Transitive),
            (ACC_STATIC_PHASE, RequiresModifier::Static),
            (ACC_SYNTHETIC, RequiresModifier::Synthetic),
            (ACC_MANDATED, RequiresModifier::Mandated),
        ]
        .into_iter()
        .filter(|(bit, _)| flags & bit != 0)
        .map(|(_, modifier)| modifier);
        descriptor = descriptor.with_requires(module, modifiers);
    }

    let exports = body.u2()?;
    for _ in 0..exports {
        let (package, targets) = read_package_targets(body, pool)?;
        descriptor = descriptor.with_exports_to(package, targets);
    }

    let opens = body.u2()?;
    for _ in 0..opens {
        let (package, targets) = read_package_targets(body, pool)?;
        descriptor = descriptor.with_opens_to(package, targets);
    }

    let uses = body.u2()?;
    for _ in 0..uses {
        descriptor = descriptor.with_uses(pool.class(body.u2()?)?);
    }

    let provides = body.u2()?;
    for _ in 0..provides {
        let service = pool.class(body.u2()?)?;
        let count = body.u2()?;
        let mut providers = Vec::with_capacity(count as usize);
        for _ in 0..count {
            providers.push(pool.class(body.u2()?)?);
        }
        descriptor = descriptor.with_provides(service, providers);
    }

    Ok(descriptor)
}

fn read_package_targets(body: &mut Reader<'_>, pool: &ConstantPool) -> Result<(String, Vec<String>)> {
    let package = pool.package(body.u2()?)?;
    body.u2()?;
    let count = body.u2()?;
    let mut targets = Vec::with_capacity(count as usize);
    for _ in 0..count {
        targets.push(pool.module(body.u2()?)?);
    }
    Ok((package, targets))
}

fn skip_attributes(reader: &mut Reader<'_>) -> Result<()> {
    let count = reader.u2()?;
    for _ in 0..count {
        reader.u2()?;
        let length = reader.u4()? as usize;
        reader.skip(length)?;
    }
    Ok(())
}

fn put_u2(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| Error::ClassFormat(format!("truncated at offset {}", self.pos)))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn skip(&mut self, len: usize) -> Result<()> {
        self.take(len).map(|_| ())
    }

    fn u1(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u2(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u4(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}

#[derive(Debug)]
enum Constant {
    Utf8(String),
    Class(u16),
    Module(u16),
    Package(u16),
    Other,
}

struct ConstantPool {
    entries: Vec<Constant>,
}

impl ConstantPool {
    fn read(reader: &mut Reader<'_>) -> Result<Self> {
        let count = reader.u2()? as usize;
        // index 0 is unused
        let mut entries = vec![Constant::Other];
        while entries.len() < count {
            let tag = reader.u1()?;
            let constant = match tag {
                CONSTANT_UTF8 => {
                    let len = reader.u2()? as usize;
                    Constant::Utf8(String::from_utf8_lossy(reader.take(len)?).into_owned())
                }
                CONSTANT_CLASS => Constant::Class(reader.u2()?),
                CONSTANT_MODULE => Constant::Module(reader.u2()?),
                CONSTANT_PACKAGE => Constant::Package(reader.u2()?),
                8 | 16 => {
                    reader.skip(2)?;
                    Constant::Other
                }
                15 => {
                    reader.skip(3)?;
                    Constant::Other
                }
                3 | 4 | 9 | 10 | 11 | 12 | 17 | 18 => {
                    reader.skip(4)?;
                    Constant::Other
                }
                5 | 6 => {
                    // long and double occupy two slots
                    reader.skip(8)?;
                    entries.push(Constant::Other);
                    Constant::Other
                }
                other => {
                    return Err(Error::ClassFormat(format!("unknown constant tag {other}")));
                }
            };
            entries.push(constant);
        }
        Ok(Self { entries })
    }

    fn get(&self, index: u16) -> Result<&Constant> {
        self.entries
            .get(index as usize)
            .filter(|_| index != 0)
            .ok_or_else(|| Error::ClassFormat(format!("bad constant pool index {index}")))
    }

    fn utf8(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            Constant::Utf8(value) => Ok(value),
            other => Err(Error::ClassFormat(format!(
                "constant {index} is {other:?}, expected Utf8"
            ))),
        }
    }

    fn module(&self, index: u16) -> Result<String> {
        match self.get(index)? {
            Constant::Module(name) => Ok(self.utf8(*name)?.to_string()),
            other => Err(Error::ClassFormat(format!(
                "constant {index} is {other:?}, expected Module"
            ))),
        }
    }

    /// Package names are stored in internal form (`a/b/c`)
    fn package(&self, index: u16) -> Result<String> {
        match self.get(index)? {
            Constant::Package(name) => Ok(self.utf8(*name)?.replace('/', ".")),
            other => Err(Error::ClassFormat(format!(
                "constant {index} is {other:?}, expected Package"
            ))),
        }
    }

    fn class(&self, index: u16) -> Result<String> {
        match self.get(index)? {
            Constant::Class(name) => Ok(self.utf8(*name)?.replace('/', ".")),
            other => Err(Error::ClassFormat(format!(
                "constant {index} is {other:?}, expected Class"
            ))),
        }
    }
}

#[derive(Default)]
struct ConstantPoolWriter {
    bytes: Vec<u8>,
    count: u16,
    indices: HashMap<(u8, String), u16>,
}

impl ConstantPoolWriter {
    fn next_index(&mut self) -> Result<u16> {
        if self.count == 0 {
            self.count = 1;
        }
        let index = self.count;
        self.count = self
            .count
            .checked_add(1)
            .ok_or_else(|| Error::ClassFormat("constant pool overflow".to_string()))?;
        Ok(index)
    }

    fn utf8(&mut self, value: &str) -> Result<u16> {
        if let Some(index) = self.indices.get(&(CONSTANT_UTF8, value.to_string())) {
            return Ok(*index);
        }
        let len = u2_len("bytes in a constant", value.len())?;
        let index = self.next_index()?;
        self.bytes.push(CONSTANT_UTF8);
        put_u2(&mut self.bytes, len);
        self.bytes.extend_from_slice(value.as_bytes());
        self.indices.insert((CONSTANT_UTF8, value.to_string()), index);
        Ok(index)
    }

    fn named(&mut self, tag: u8, name: &str) -> Result<u16> {
        if let Some(index) = self.indices.get(&(tag, name.to_string())) {
            return Ok(*index);
        }
        let name_index = self.utf8(name)?;
        let index = self.next_index()?;
        self.bytes.push(tag);
        put_u2(&mut self.bytes, name_index);
        self.indices.insert((tag, name.to_string()), index);
        Ok(index)
    }

    fn class(&mut self, name: &str) -> Result<u16> {
        self.named(CONSTANT_CLASS, &name.replace('.', "/"))
    }

    fn module(&mut self, name: &str) -> Result<u16> {
        self.named(CONSTANT_MODULE, name)
    }

    fn package(&mut self, name: &str) -> Result<u16> {
        self.named(CONSTANT_PACKAGE, &name.replace('.', "/"))
    }
}
