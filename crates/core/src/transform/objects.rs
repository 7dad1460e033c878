//! Small lookup helpers over lopdf objects.

use flate2::read::ZlibDecoder;
use lopdf::{Dictionary, Document, Object, Stream};
use std::io::Read;

const MAX_REFERENCE_DEPTH: usize = 16;

/// Follows references until a direct object is reached.
pub(crate) fn deref<'a>(doc: &'a Document, mut obj: &'a Object) -> Option<&'a Object> {
    for _ in 0..MAX_REFERENCE_DEPTH {
        match obj {
            Object::Reference(id) => obj = doc.get_object(*id).ok()?,
            other => return Some(other),
        }
    }
    None
}

pub(crate) fn get<'a>(doc: &'a Document, dict: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
    dict.get(key).ok().and_then(|obj| deref(doc, obj))
}

pub(crate) fn get_dict<'a>(
    doc: &'a Document,
    dict: &'a Dictionary,
    key: &[u8],
) -> Option<&'a Dictionary> {
    match get(doc, dict, key)? {
        Object::Dictionary(d) => Some(d),
        Object::Stream(s) => Some(&s.dict),
        _ => None,
    }
}

pub(crate) fn get_int(doc: &Document, dict: &Dictionary, key: &[u8]) -> Option<i64> {
    match get(doc, dict, key)? {
        Object::Integer(i) => Some(*i),
        Object::Real(r) => Some(*r as i64),
        _ => None,
    }
}

pub(crate) fn get_bool(doc: &Document, dict: &Dictionary, key: &[u8]) -> bool {
    matches!(get(doc, dict, key), Some(Object::Boolean(true)))
}

pub(crate) fn get_name<'a>(doc: &'a Document, dict: &'a Dictionary, key: &[u8]) -> Option<&'a [u8]> {
    get(doc, dict, key)?.as_name().ok()
}

pub(crate) fn get_numbers(doc: &Document, dict: &Dictionary, key: &[u8]) -> Option<Vec<f64>> {
    let Object::Array(items) = get(doc, dict, key)? else {
        return None;
    };
    items
        .iter()
        .map(|item| match deref(doc, item)? {
            Object::Integer(i) => Some(*i as f64),
            Object::Real(r) => Some(*r as f64),
            _ => None,
        })
        .collect()
}

/// Filter chain of a stream with abbreviations expanded.
pub(crate) fn filters(doc: &Document, dict: &Dictionary) -> Vec<String> {
    let names: Vec<&[u8]> = match get(doc, dict, b"Filter") {
        Some(Object::Name(name)) => vec![name.as_slice()],
        Some(Object::Array(items)) => items
            .iter()
            .filter_map(|item| deref(doc, item)?.as_name().ok())
            .collect(),
        _ => Vec::new(),
    };
    names
        .into_iter()
        .map(|name| match name {
            b"Fl" => "FlateDecode".to_string(),
            b"DCT" => "DCTDecode".to_string(),
            b"LZW" => "LZWDecode".to_string(),
            b"AHx" => "ASCIIHexDecode".to_string(),
            b"A85" => "ASCII85Decode".to_string(),
            b"RL" => "RunLengthDecode".to_string(),
            b"CCF" => "CCITTFaxDecode".to_string(),
            other => String::from_utf8_lossy(other).into_owned(),
        })
        .collect()
}

/// Human-readable filter chain, `raw` when unfiltered.
pub(crate) fn encoding_label(filters: &[String]) -> String {
    if filters.is_empty() {
        "raw".to_string()
    } else {
        filters.join("+")
    }
}

/// Why a stream's filter chain could not be undone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FilterError {
    Unsupported(String),
    Corrupt(String),
}

impl std::fmt::Display for FilterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterError::Unsupported(reason) | FilterError::Corrupt(reason) => f.write_str(reason),
        }
    }
}

/// Decoded stream bytes. Flate and LZW are undone here, including PNG
/// predictors; any other filter is rejected.
pub(crate) fn stream_bytes(doc: &Document, stream: &Stream) -> Result<Vec<u8>, FilterError> {
    let chain = filters(doc, &stream.dict);
    let params = decode_parms(doc, &stream.dict, chain.len());

    let mut data = stream.content.clone();
    for (filter, parms) in chain.iter().zip(params) {
        data = match filter.as_str() {
            "FlateDecode" => inflate(&data)?,
            "LZWDecode" => {
                let early_change = parms
                    .and_then(|p| get_int(doc, p, b"EarlyChange"))
                    .map(|v| v != 0)
                    .unwrap_or(true);
                lzw_decode(&data, early_change)?
            }
            other => return Err(FilterError::Unsupported(format!("unsupported filter {}", other))),
        };
        if let Some(parms) = parms {
            data = unpredict(doc, parms, data)?;
        }
    }
    Ok(data)
}

/// `/DecodeParms` per filter; a single dictionary applies to a single filter.
fn decode_parms<'a>(doc: &'a Document, dict: &'a Dictionary, count: usize) -> Vec<Option<&'a Dictionary>> {
    let mut parms = match get(doc, dict, b"DecodeParms") {
        Some(Object::Dictionary(d)) => vec![Some(d)],
        Some(Object::Array(items)) => items
            .iter()
            .map(|item| match deref(doc, item) {
                Some(Object::Dictionary(d)) => Some(d),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };
    parms.resize(count, None);
    parms
}

fn inflate(data: &[u8]) -> Result<Vec<u8>, FilterError> {
    let mut out = Vec::with_capacity(data.len() * 2);
    ZlibDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| FilterError::Corrupt(format!("FlateDecode: {}", e)))?;
    Ok(out)
}

fn lzw_decode(data: &[u8], early_change: bool) -> Result<Vec<u8>, FilterError> {
    let mut decoder = if early_change {
        weezl::decode::Decoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8)
    } else {
        weezl::decode::Decoder::new(weezl::BitOrder::Msb, 8)
    };
    decoder
        .decode(data)
        .map_err(|e| FilterError::Corrupt(format!("LZWDecode: {}", e)))
}

/// Reverses a `/Predictor` from the filter's parameters.
fn unpredict(doc: &Document, parms: &Dictionary, data: Vec<u8>) -> Result<Vec<u8>, FilterError> {
    let predictor = get_int(doc, parms, b"Predictor").unwrap_or(1);
    match predictor {
        1 => Ok(data),
        10..=15 => {
            let colors = get_int(doc, parms, b"Colors").unwrap_or(1).max(1) as usize;
            let bpc = get_int(doc, parms, b"BitsPerComponent").unwrap_or(8).max(1) as usize;
            let columns = get_int(doc, parms, b"Columns").unwrap_or(1).max(1) as usize;
            let bytes_per_pixel = (colors * bpc / 8).max(1);
            let row_bytes = (columns * colors * bpc + 7) / 8;
            lopdf::filters::png::decode_frame(&data, bytes_per_pixel, row_bytes / bytes_per_pixel)
                .map_err(|e| FilterError::Corrupt(format!("PNG predictor: {}", e)))
        }
        other => Err(FilterError::Unsupported(format!("unsupported predictor {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deref_follows_references() {
        let mut doc = Document::with_version("1.5");
        let target = doc.add_object(Object::Integer(42));
        let outer = doc.add_object(Object::Reference(target));
        let obj = Object::Reference(outer);
        assert_eq!(deref(&doc, &obj), Some(&Object::Integer(42)));
    }

    #[test]
    fn test_deref_rejects_cycles() {
        let mut doc = Document::with_version("1.5");
        let id = doc.new_object_id();
        doc.objects.insert(id, Object::Reference(id));
        assert_eq!(deref(&doc, &Object::Reference(id)), None);
    }

    #[test]
    fn test_filters_expand_abbreviations() {
        let doc = Document::with_version("1.5");
        let mut dict = Dictionary::new();
        dict.set(
            "Filter",
            Object::Array(vec![
                Object::Name(b"Fl".to_vec()),
                Object::Name(b"DCTDecode".to_vec()),
            ]),
        );
        let chain = filters(&doc, &dict);
        assert_eq!(chain, vec!["FlateDecode", "DCTDecode"]);
        assert_eq!(encoding_label(&chain), "FlateDecode+DCTDecode");
        assert_eq!(encoding_label(&[]), "raw");
    }

    #[test]
    fn test_numbers() {
        let doc = Document::with_version("1.5");
        let mut dict = Dictionary::new();
        dict.set(
            "Decode",
            Object::Array(vec![Object::Integer(1), Object::Real(0.0)]),
        );
        assert_eq!(get_numbers(&doc, &dict, b"Decode"), Some(vec![1.0, 0.0]));
        assert_eq!(get_numbers(&doc, &dict, b"Missing"), None);
    }
}
