//! Decoding PDF image streams to pixels and encoding them back.

use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, GrayImage, ImageEncoder, RgbImage};
use lopdf::{Document, Object, Stream};
use std::io::Write;

use super::colorspace::ColorSpace;
use super::objects::{filters, get, get_int, get_numbers, stream_bytes, FilterError};
use super::types::{scaled_dimensions, ColorMode};
use crate::job::{ImageFormat, JobParams};

/// Largest image accepted for decoding, in pixels.
const MAX_PIXELS: u64 = 1 << 28;

/// Why an image could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DecodeIssue {
    Unsupported(String),
    Corrupt(String),
}

/// Pixels of a source image, normalized to 8-bit gray or RGB.
pub(crate) struct SourceImage {
    pub image: DynamicImage,
    pub color: ColorMode,
}

/// A re-encoded image ready to be written as a stream.
#[derive(Debug)]
pub(crate) struct EncodedImage {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub color: ColorMode,
    pub filter: &'static str,
}

pub(crate) fn decode(doc: &Document, stream: &Stream) -> Result<SourceImage, DecodeIssue> {
    let dict = &stream.dict;
    let width = dimension(doc, stream, b"Width")?;
    let height = dimension(doc, stream, b"Height")?;
    if width as u64 * height as u64 > MAX_PIXELS {
        return Err(DecodeIssue::Unsupported(format!(
            "{}x{} exceeds the pixel limit",
            width, height
        )));
    }

    let chain = filters(doc, dict);
    if chain.last().map(String::as_str) == Some("DCTDecode") {
        if chain.len() > 1 {
            return Err(DecodeIssue::Unsupported(format!(
                "filter chain {}",
                chain.join("+")
            )));
        }
        return decode_jpeg(&stream.content);
    }

    let space = match dict.get(b"ColorSpace") {
        Ok(obj) => ColorSpace::resolve(doc, obj).map_err(DecodeIssue::Unsupported)?,
        Err(_) => return Err(DecodeIssue::Unsupported("missing ColorSpace".to_string())),
    };
    let bpc = get_int(doc, dict, b"BitsPerComponent").unwrap_or(8);
    if !matches!(bpc, 1 | 2 | 4 | 8 | 16) {
        return Err(DecodeIssue::Unsupported(format!("{} bits per component", bpc)));
    }
    let bpc = bpc as u32;
    if bpc == 16 && matches!(space, ColorSpace::Indexed { .. }) {
        return Err(DecodeIssue::Unsupported("16-bit indexed image".to_string()));
    }

    let data = stream_bytes(doc, stream).map_err(|e| match e {
        FilterError::Unsupported(reason) => DecodeIssue::Unsupported(reason),
        FilterError::Corrupt(reason) => DecodeIssue::Corrupt(reason),
    })?;

    let mut samples = unpack_samples(&data, width, height, space.components(), bpc)
        .map_err(DecodeIssue::Corrupt)?;
    let color = space.mode();

    let image = match space {
        ColorSpace::Indexed { base, hival, lookup } => expand_indexed(
            &samples,
            width,
            height,
            &base,
            hival,
            &lookup,
        ),
        space => {
            if bpc < 8 {
                let max = (1u32 << bpc) - 1;
                for s in samples.iter_mut() {
                    *s = (*s as u32 * 255 / max) as u8;
                }
            }
            if let Some(decode) = get_numbers(doc, dict, b"Decode") {
                apply_decode_array(&mut samples, space.components(), &decode);
            }
            match space {
                ColorSpace::Gray => GrayImage::from_raw(width, height, samples)
                    .map(DynamicImage::ImageLuma8),
                ColorSpace::Rgb => {
                    RgbImage::from_raw(width, height, samples).map(DynamicImage::ImageRgb8)
                }
                _ => RgbImage::from_raw(width, height, cmyk_to_rgb(&samples))
                    .map(DynamicImage::ImageRgb8),
            }
        }
    }
    .ok_or_else(|| DecodeIssue::Corrupt("sample buffer does not match dimensions".to_string()))?;

    Ok(SourceImage { image, color })
}

fn dimension(doc: &Document, stream: &Stream, key: &[u8]) -> Result<u32, DecodeIssue> {
    match get(doc, &stream.dict, key) {
        Some(Object::Integer(v)) if *v > 0 && *v <= u32::MAX as i64 => Ok(*v as u32),
        _ => Err(DecodeIssue::Corrupt(format!(
            "missing or invalid {}",
            String::from_utf8_lossy(key)
        ))),
    }
}

fn decode_jpeg(data: &[u8]) -> Result<SourceImage, DecodeIssue> {
    let image = image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)
        .map_err(|e| DecodeIssue::Corrupt(format!("JPEG: {}", e)))?;
    Ok(match image {
        DynamicImage::ImageLuma8(_) => SourceImage {
            image,
            color: ColorMode::Gray,
        },
        other => SourceImage {
            image: DynamicImage::ImageRgb8(other.to_rgb8()),
            color: ColorMode::Rgb,
        },
    })
}

/// Splits packed rows into one byte per sample. Rows are byte-aligned;
/// sub-byte samples keep their raw value, 16-bit samples keep the high byte.
fn unpack_samples(
    data: &[u8],
    width: u32,
    height: u32,
    components: usize,
    bpc: u32,
) -> Result<Vec<u8>, String> {
    let per_row = width as usize * components;
    let row_bytes = (per_row * bpc as usize + 7) / 8;
    let needed = row_bytes * height as usize;
    if data.len() < needed {
        return Err(format!(
            "truncated image data: {} bytes, expected {}",
            data.len(),
            needed
        ));
    }
    if bpc == 8 {
        return Ok(data[..needed].to_vec());
    }

    let mut out = Vec::with_capacity(per_row * height as usize);
    for row in data[..needed].chunks(row_bytes) {
        match bpc {
            16 => out.extend(row.chunks(2).take(per_row).map(|pair| pair[0])),
            _ => {
                let mask = (1u8 << bpc) - 1;
                for i in 0..per_row {
                    let bit = i * bpc as usize;
                    let shift = 8 - bpc as usize - (bit % 8);
                    out.push((row[bit / 8] >> shift) & mask);
                }
            }
        }
    }
    Ok(out)
}

/// Applies a non-default `/Decode` range, e.g. `[1 0]` to invert gray.
fn apply_decode_array(samples: &mut [u8], components: usize, decode: &[f64]) {
    if decode.len() < components * 2 {
        return;
    }
    let identity = decode
        .chunks(2)
        .take(components)
        .all(|pair| pair[0] == 0.0 && pair[1] == 1.0);
    if identity {
        return;
    }
    for (i, s) in samples.iter_mut().enumerate() {
        let c = i % components;
        let (lo, hi) = (decode[c * 2], decode[c * 2 + 1]);
        let v = lo + (*s as f64 / 255.0) * (hi - lo);
        *s = (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    }
}

fn cmyk_to_rgb(samples: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(samples.len() / 4 * 3);
    for px in samples.chunks_exact(4) {
        let k = 1.0 - px[3] as f32 / 255.0;
        for c in &px[..3] {
            rgb.push(((1.0 - *c as f32 / 255.0) * k * 255.0).round() as u8);
        }
    }
    rgb
}

fn expand_indexed(
    indices: &[u8],
    width: u32,
    height: u32,
    base: &ColorSpace,
    hival: u8,
    lookup: &[u8],
) -> Option<DynamicImage> {
    let n = base.components();
    let entry = |idx: u8| palette_entry(lookup, idx.min(hival), n);
    match base {
        ColorSpace::Gray => {
            let pixels = indices.iter().map(|&i| entry(i)[0]).collect();
            GrayImage::from_raw(width, height, pixels).map(DynamicImage::ImageLuma8)
        }
        ColorSpace::Rgb => {
            let pixels = indices.iter().flat_map(|&i| entry(i).to_vec()).collect();
            RgbImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgb8)
        }
        ColorSpace::Cmyk => {
            let cmyk: Vec<u8> = indices.iter().flat_map(|&i| entry(i).to_vec()).collect();
            RgbImage::from_raw(width, height, cmyk_to_rgb(&cmyk)).map(DynamicImage::ImageRgb8)
        }
        ColorSpace::Indexed { .. } => None,
    }
}

fn palette_entry(lookup: &[u8], idx: u8, components: usize) -> &[u8] {
    let start = idx as usize * components;
    &lookup[start..start + components]
}

/// Applies grayscale, resize and the target encoding.
pub(crate) fn encode(image: DynamicImage, params: &JobParams) -> Result<EncodedImage, String> {
    let mut image = image;
    if params.grayscale && !matches!(image, DynamicImage::ImageLuma8(_)) {
        image = DynamicImage::ImageLuma8(image.to_luma8());
    }

    let (width, height) = scaled_dimensions(image.width(), image.height(), params.ratio);
    if (width, height) != (image.width(), image.height()) {
        image = image.resize_exact(width, height, FilterType::Triangle);
    }

    let (raw, color_type, color) = match image {
        DynamicImage::ImageLuma8(buf) => (buf.into_raw(), ExtendedColorType::L8, ColorMode::Gray),
        other => (
            other.to_rgb8().into_raw(),
            ExtendedColorType::Rgb8,
            ColorMode::Rgb,
        ),
    };

    let data = match params.format {
        ImageFormat::Jpeg => {
            let mut out = Vec::new();
            JpegEncoder::new_with_quality(&mut out, params.quality.clamp(1, 100))
                .write_image(&raw, width, height, color_type)
                .map_err(|e| e.to_string())?;
            out
        }
        ImageFormat::Png => {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
            encoder.write_all(&raw).map_err(|e| e.to_string())?;
            encoder.finish().map_err(|e| e.to_string())?
        }
    };

    Ok(EncodedImage {
        data,
        width,
        height,
        color,
        filter: params.format.pdf_filter(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::Dictionary;

    fn image_stream(width: i64, height: i64, space: &str, bpc: i64, data: Vec<u8>) -> Stream {
        let mut dict = Dictionary::new();
        dict.set("Type", Object::Name(b"XObject".to_vec()));
        dict.set("Subtype", Object::Name(b"Image".to_vec()));
        dict.set("Width", Object::Integer(width));
        dict.set("Height", Object::Integer(height));
        dict.set("ColorSpace", Object::Name(space.as_bytes().to_vec()));
        dict.set("BitsPerComponent", Object::Integer(bpc));
        Stream::new(dict, data)
    }

    fn params(format: ImageFormat, ratio: f64, grayscale: bool) -> JobParams {
        JobParams {
            format,
            quality: 75,
            ratio,
            grayscale,
        }
    }

    #[test]
    fn test_decode_raw_rgb() {
        let doc = Document::with_version("1.5");
        let stream = image_stream(2, 2, "DeviceRGB", 8, vec![10; 12]);
        let source = decode(&doc, &stream).unwrap();
        assert_eq!(source.color, ColorMode::Rgb);
        assert_eq!((source.image.width(), source.image.height()), (2, 2));
    }

    fn deflate(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_decode_flate_rgb() {
        let doc = Document::with_version("1.5");
        let pixels: Vec<u8> = (0..12).map(|i| i * 20).collect();
        let mut stream = image_stream(2, 2, "DeviceRGB", 8, deflate(&pixels));
        stream.dict.set("Filter", Object::Name(b"FlateDecode".to_vec()));

        let source = decode(&doc, &stream).unwrap();
        assert_eq!(source.color, ColorMode::Rgb);
        assert_eq!(source.image.to_rgb8().as_raw(), &pixels);
    }

    #[test]
    fn test_decode_flate_with_png_predictor() {
        let doc = Document::with_version("1.5");
        // One row, Sub filter: the second pixel is stored as a delta.
        let row = vec![1, 10, 20, 30, 5, 5, 5];
        let mut stream = image_stream(2, 1, "DeviceRGB", 8, deflate(&row));
        stream.dict.set("Filter", Object::Name(b"FlateDecode".to_vec()));
        let mut parms = Dictionary::new();
        parms.set("Predictor", Object::Integer(15));
        parms.set("Colors", Object::Integer(3));
        parms.set("Columns", Object::Integer(2));
        stream.dict.set("DecodeParms", Object::Dictionary(parms));

        let rgb = decode(&doc, &stream).unwrap().image.to_rgb8();
        assert_eq!(rgb.as_raw(), &vec![10, 20, 30, 15, 25, 35]);
    }

    #[test]
    fn test_decode_lzw_gray() {
        let doc = Document::with_version("1.5");
        let pixels = vec![7u8, 7, 7, 7, 200, 200, 200, 200, 7];
        let encoded = weezl::encode::Encoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8)
            .encode(&pixels)
            .unwrap();
        let mut stream = image_stream(3, 3, "DeviceGray", 8, encoded);
        stream.dict.set("Filter", Object::Name(b"LZWDecode".to_vec()));

        let gray = decode(&doc, &stream).unwrap().image.to_luma8();
        assert_eq!(gray.as_raw(), &pixels);
    }

    #[test]
    fn test_decode_corrupt_flate() {
        let doc = Document::with_version("1.5");
        let mut stream = image_stream(2, 2, "DeviceGray", 8, b"definitely not zlib".to_vec());
        stream.dict.set("Filter", Object::Name(b"FlateDecode".to_vec()));
        assert!(matches!(decode(&doc, &stream), Err(DecodeIssue::Corrupt(_))));
    }

    #[test]
    fn test_decode_one_bit_gray() {
        let doc = Document::with_version("1.5");
        // Row 1: 1010 padded; row 2: 0101 padded.
        let stream = image_stream(4, 2, "DeviceGray", 1, vec![0b1010_0000, 0b0101_0000]);
        let source = decode(&doc, &stream).unwrap();
        let gray = source.image.to_luma8();
        assert_eq!(gray.as_raw(), &vec![255, 0, 255, 0, 0, 255, 0, 255]);
    }

    #[test]
    fn test_decode_array_inverts() {
        let doc = Document::with_version("1.5");
        let mut stream = image_stream(2, 1, "DeviceGray", 8, vec![0, 255]);
        stream.dict.set(
            "Decode",
            Object::Array(vec![Object::Integer(1), Object::Integer(0)]),
        );
        let gray = decode(&doc, &stream).unwrap().image.to_luma8();
        assert_eq!(gray.as_raw(), &vec![255, 0]);
    }

    #[test]
    fn test_decode_cmyk_normalizes_to_rgb() {
        let doc = Document::with_version("1.5");
        let stream = image_stream(1, 1, "DeviceCMYK", 8, vec![0, 0, 0, 0]);
        let source = decode(&doc, &stream).unwrap();
        assert_eq!(source.color, ColorMode::Cmyk);
        assert_eq!(source.image.to_rgb8().as_raw(), &vec![255, 255, 255]);
    }

    #[test]
    fn test_decode_truncated_data() {
        let doc = Document::with_version("1.5");
        let stream = image_stream(10, 10, "DeviceRGB", 8, vec![0; 20]);
        assert!(matches!(decode(&doc, &stream), Err(DecodeIssue::Corrupt(_))));
    }

    #[test]
    fn test_decode_unsupported_filter() {
        let doc = Document::with_version("1.5");
        let mut stream = image_stream(2, 2, "DeviceGray", 8, vec![0; 4]);
        stream
            .dict
            .set("Filter", Object::Name(b"JBIG2Decode".to_vec()));
        assert!(matches!(decode(&doc, &stream), Err(DecodeIssue::Unsupported(_))));
    }

    #[test]
    fn test_decode_corrupt_jpeg() {
        let doc = Document::with_version("1.5");
        let mut stream = image_stream(2, 2, "DeviceRGB", 8, b"not a jpeg".to_vec());
        stream.dict.set("Filter", Object::Name(b"DCTDecode".to_vec()));
        assert!(matches!(decode(&doc, &stream), Err(DecodeIssue::Corrupt(_))));
    }

    #[test]
    fn test_encode_jpeg_half_size_gray() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 20, image::Rgb([200, 30, 30])));
        let encoded = encode(image, &params(ImageFormat::Jpeg, 0.5, true)).unwrap();

        assert_eq!((encoded.width, encoded.height), (20, 10));
        assert_eq!(encoded.color, ColorMode::Gray);
        assert_eq!(encoded.filter, "DCTDecode");

        let decoded =
            image::load_from_memory_with_format(&encoded.data, image::ImageFormat::Jpeg).unwrap();
        assert!(matches!(decoded, DynamicImage::ImageLuma8(_)));
        assert_eq!((decoded.width(), decoded.height()), (20, 10));
    }

    #[test]
    fn test_encode_quality_zero_still_encodes() {
        let image = DynamicImage::ImageLuma8(GrayImage::from_pixel(8, 8, image::Luma([128])));
        let mut p = params(ImageFormat::Jpeg, 1.0, false);
        p.quality = 0;
        let encoded = encode(image, &p).unwrap();
        assert!(!encoded.data.is_empty());
    }

    #[test]
    fn test_encode_png_is_lossless_flate() {
        let pixels: Vec<u8> = (0..48).collect();
        let image = DynamicImage::ImageRgb8(RgbImage::from_raw(4, 4, pixels.clone()).unwrap());
        let encoded = encode(image, &params(ImageFormat::Png, 1.0, false)).unwrap();
        assert_eq!(encoded.filter, "FlateDecode");

        use flate2::read::ZlibDecoder;
        use std::io::Read;
        let mut restored = Vec::new();
        ZlibDecoder::new(encoded.data.as_slice())
            .read_to_end(&mut restored)
            .unwrap();
        assert_eq!(restored, pixels);
    }
}
