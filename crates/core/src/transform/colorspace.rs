use lopdf::{Document, Object};

use super::objects::{deref, get_int, stream_bytes};
use super::types::ColorMode;

const MAX_NESTING: usize = 4;

/// A resolved image color space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ColorSpace {
    Gray,
    Rgb,
    Cmyk,
    Indexed {
        base: Box<ColorSpace>,
        hival: u8,
        lookup: Vec<u8>,
    },
}

impl ColorSpace {
    pub fn components(&self) -> usize {
        match self {
            ColorSpace::Gray | ColorSpace::Indexed { .. } => 1,
            ColorSpace::Rgb => 3,
            ColorSpace::Cmyk => 4,
        }
    }

    pub fn mode(&self) -> ColorMode {
        match self {
            ColorSpace::Gray => ColorMode::Gray,
            ColorSpace::Rgb => ColorMode::Rgb,
            ColorSpace::Cmyk => ColorMode::Cmyk,
            ColorSpace::Indexed { .. } => ColorMode::Indexed,
        }
    }

    pub fn resolve(doc: &Document, obj: &Object) -> Result<Self, String> {
        resolve_at(doc, obj, 0)
    }
}

fn resolve_at(doc: &Document, obj: &Object, depth: usize) -> Result<ColorSpace, String> {
    if depth > MAX_NESTING {
        return Err("color space nested too deeply".to_string());
    }
    match deref(doc, obj).ok_or("dangling color space reference")? {
        Object::Name(name) => from_name(name),
        Object::Array(items) => {
            let family = items
                .first()
                .and_then(|o| deref(doc, o))
                .and_then(|o| o.as_name().ok())
                .ok_or("malformed color space array")?;
            match family {
                b"ICCBased" => {
                    let profile = items
                        .get(1)
                        .and_then(|o| deref(doc, o))
                        .and_then(|o| o.as_stream().ok())
                        .ok_or("ICCBased without profile stream")?;
                    match get_int(doc, &profile.dict, b"N") {
                        Some(1) => Ok(ColorSpace::Gray),
                        Some(3) => Ok(ColorSpace::Rgb),
                        Some(4) => Ok(ColorSpace::Cmyk),
                        _ => match profile.dict.get(b"Alternate") {
                            Ok(alt) => resolve_at(doc, alt, depth + 1),
                            Err(_) => Err("ICCBased profile with unknown component count".to_string()),
                        },
                    }
                }
                b"CalGray" => Ok(ColorSpace::Gray),
                b"CalRGB" => Ok(ColorSpace::Rgb),
                b"Indexed" | b"I" => indexed(doc, items, depth),
                _ if items.len() == 1 => from_name(family),
                other => Err(format!(
                    "unsupported color space {}",
                    String::from_utf8_lossy(other)
                )),
            }
        }
        _ => Err("malformed color space".to_string()),
    }
}

fn from_name(name: &[u8]) -> Result<ColorSpace, String> {
    match name {
        b"DeviceGray" | b"G" | b"CalGray" => Ok(ColorSpace::Gray),
        b"DeviceRGB" | b"RGB" | b"CalRGB" => Ok(ColorSpace::Rgb),
        b"DeviceCMYK" | b"CMYK" => Ok(ColorSpace::Cmyk),
        other => Err(format!(
            "unsupported color space {}",
            String::from_utf8_lossy(other)
        )),
    }
}

fn indexed(doc: &Document, items: &[Object], depth: usize) -> Result<ColorSpace, String> {
    let [_, base, hival, lookup] = items else {
        return Err("Indexed color space needs 4 entries".to_string());
    };
    let base = resolve_at(doc, base, depth + 1)?;
    if matches!(base, ColorSpace::Indexed { .. }) {
        return Err("Indexed base cannot be Indexed".to_string());
    }
    let hival = match deref(doc, hival) {
        Some(Object::Integer(v)) if (0..=255).contains(v) => *v as u8,
        _ => return Err("Indexed hival out of range".to_string()),
    };
    let lookup = match deref(doc, lookup) {
        Some(Object::String(bytes, _)) => bytes.clone(),
        Some(Object::Stream(stream)) => stream_bytes(doc, stream).map_err(|e| e.to_string())?,
        _ => return Err("Indexed lookup missing".to_string()),
    };
    let needed = (hival as usize + 1) * base.components();
    if lookup.len() < needed {
        return Err(format!(
            "Indexed lookup has {} bytes, expected {}",
            lookup.len(),
            needed
        ));
    }
    Ok(ColorSpace::Indexed {
        base: Box::new(base),
        hival,
        lookup,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{Dictionary, Stream, StringFormat};

    fn name(n: &str) -> Object {
        Object::Name(n.as_bytes().to_vec())
    }

    #[test]
    fn test_device_names() {
        let doc = Document::with_version("1.5");
        assert_eq!(ColorSpace::resolve(&doc, &name("DeviceGray")), Ok(ColorSpace::Gray));
        assert_eq!(ColorSpace::resolve(&doc, &name("DeviceRGB")), Ok(ColorSpace::Rgb));
        assert_eq!(ColorSpace::resolve(&doc, &name("DeviceCMYK")), Ok(ColorSpace::Cmyk));
        assert!(ColorSpace::resolve(&doc, &name("Pattern")).is_err());
    }

    #[test]
    fn test_icc_based_uses_component_count() {
        let mut doc = Document::with_version("1.5");
        let mut dict = Dictionary::new();
        dict.set("N", Object::Integer(1));
        let profile = doc.add_object(Object::Stream(Stream::new(dict, vec![0u8; 16])));
        let cs = Object::Array(vec![name("ICCBased"), Object::Reference(profile)]);
        assert_eq!(ColorSpace::resolve(&doc, &cs), Ok(ColorSpace::Gray));
    }

    #[test]
    fn test_indexed_with_string_lookup() {
        let doc = Document::with_version("1.5");
        let cs = Object::Array(vec![
            name("Indexed"),
            name("DeviceRGB"),
            Object::Integer(1),
            Object::String(vec![255, 0, 0, 0, 0, 255], StringFormat::Hexadecimal),
        ]);
        let resolved = ColorSpace::resolve(&doc, &cs).unwrap();
        assert_eq!(resolved.components(), 1);
        assert_eq!(resolved.mode(), ColorMode::Indexed);
        match resolved {
            ColorSpace::Indexed { base, hival, lookup } => {
                assert_eq!(*base, ColorSpace::Rgb);
                assert_eq!(hival, 1);
                assert_eq!(lookup.len(), 6);
            }
            other => panic!("expected indexed, got {:?}", other),
        }
    }

    #[test]
    fn test_indexed_short_lookup_rejected() {
        let doc = Document::with_version("1.5");
        let cs = Object::Array(vec![
            name("Indexed"),
            name("DeviceRGB"),
            Object::Integer(3),
            Object::String(vec![0; 6], StringFormat::Literal),
        ]);
        assert!(ColorSpace::resolve(&doc, &cs).is_err());
    }
}
