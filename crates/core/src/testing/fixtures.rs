//! Small PDF documents built in memory for tests.

use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::io::Write;

/// Color model of a generated image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixtureColor {
    Gray,
    Rgb,
}

/// How a generated image's samples are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageEncoding {
    Raw,
    Flate,
    Jpeg,
}

/// Shape of a generated image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSpec {
    pub width: u32,
    pub height: u32,
    pub color: FixtureColor,
    pub encoding: ImageEncoding,
}

impl ImageSpec {
    /// Flate-compressed RGB image.
    pub fn rgb(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            color: FixtureColor::Rgb,
            encoding: ImageEncoding::Flate,
        }
    }

    /// Flate-compressed gray image.
    pub fn gray(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            color: FixtureColor::Gray,
            encoding: ImageEncoding::Flate,
        }
    }
}

/// A diagonal gradient, so resampling has something to work on.
fn pixels(spec: &ImageSpec) -> Vec<u8> {
    let channels = match spec.color {
        FixtureColor::Gray => 1,
        FixtureColor::Rgb => 3,
    };
    let mut data = Vec::with_capacity((spec.width * spec.height) as usize * channels);
    for y in 0..spec.height {
        for x in 0..spec.width {
            let v = ((x + y) * 255 / (spec.width + spec.height).max(1)) as u8;
            match spec.color {
                FixtureColor::Gray => data.push(v),
                FixtureColor::Rgb => data.extend_from_slice(&[v, 255 - v, v / 2]),
            }
        }
    }
    data
}

fn zlib(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("in-memory write");
    encoder.finish().expect("in-memory write")
}

fn name(value: &str) -> Object {
    Object::Name(value.as_bytes().to_vec())
}

/// An image XObject stream for `spec`.
pub fn image_stream(spec: &ImageSpec) -> Stream {
    let raw = pixels(spec);
    let (space, color_type) = match spec.color {
        FixtureColor::Gray => ("DeviceGray", ExtendedColorType::L8),
        FixtureColor::Rgb => ("DeviceRGB", ExtendedColorType::Rgb8),
    };

    let mut dict = Dictionary::new();
    dict.set("Type", name("XObject"));
    dict.set("Subtype", name("Image"));
    dict.set("Width", Object::Integer(spec.width as i64));
    dict.set("Height", Object::Integer(spec.height as i64));
    dict.set("ColorSpace", name(space));
    dict.set("BitsPerComponent", Object::Integer(8));

    let content = match spec.encoding {
        ImageEncoding::Raw => raw,
        ImageEncoding::Flate => {
            dict.set("Filter", name("FlateDecode"));
            zlib(&raw)
        }
        ImageEncoding::Jpeg => {
            dict.set("Filter", name("DCTDecode"));
            let mut out = Vec::new();
            JpegEncoder::new_with_quality(&mut out, 90)
                .write_image(&raw, spec.width, spec.height, color_type)
                .expect("fixture image encodes");
            out
        }
    };
    Stream::new(dict, content)
}

struct Builder {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
}

impl Builder {
    fn new() -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            kids: Vec::new(),
        }
    }

    fn add_image(&mut self, stream: Stream) -> ObjectId {
        self.doc.add_object(Object::Stream(stream))
    }

    fn add_page(&mut self, images: &[ObjectId]) {
        let mut xobjects = Dictionary::new();
        let mut content = String::new();
        for (i, id) in images.iter().enumerate() {
            let key = format!("Im{}", i);
            content.push_str(&format!("q 200 0 0 200 50 {} cm /{} Do Q\n", 50 + i * 210, key));
            xobjects.set(key, Object::Reference(*id));
        }
        let mut resources = Dictionary::new();
        resources.set("XObject", Object::Dictionary(xobjects));

        let content_id = self
            .doc
            .add_object(Object::Stream(Stream::new(Dictionary::new(), content.into_bytes())));

        let mut page = Dictionary::new();
        page.set("Type", name("Page"));
        page.set("Parent", Object::Reference(self.pages_id));
        page.set(
            "MediaBox",
            Object::Array(
                [0, 0, 612, 792]
                    .into_iter()
                    .map(Object::Integer)
                    .collect(),
            ),
        );
        page.set("Resources", Object::Dictionary(resources));
        page.set("Contents", Object::Reference(content_id));
        let page_id = self.doc.add_object(Object::Dictionary(page));
        self.kids.push(Object::Reference(page_id));
    }

    fn finish(mut self) -> Vec<u8> {
        let mut pages = Dictionary::new();
        pages.set("Type", name("Pages"));
        pages.set("Count", Object::Integer(self.kids.len() as i64));
        pages.set("Kids", Object::Array(self.kids));
        self.doc
            .objects
            .insert(self.pages_id, Object::Dictionary(pages));

        let mut catalog = Dictionary::new();
        catalog.set("Type", name("Catalog"));
        catalog.set("Pages", Object::Reference(self.pages_id));
        let catalog_id = self.doc.add_object(Object::Dictionary(catalog));
        self.doc.trailer.set("Root", Object::Reference(catalog_id));

        let mut out = Vec::new();
        self.doc.save_to(&mut out).expect("fixture document saves");
        out
    }
}

/// `count` pages, each showing one distinct image.
pub fn pdf_with_images(count: usize, spec: &ImageSpec) -> Vec<u8> {
    let mut builder = Builder::new();
    for _ in 0..count {
        let id = builder.add_image(image_stream(spec));
        builder.add_page(&[id]);
    }
    builder.finish()
}

/// `pages` pages all showing the same image object.
pub fn pdf_with_shared_image(pages: usize, spec: &ImageSpec) -> Vec<u8> {
    let mut builder = Builder::new();
    let id = builder.add_image(image_stream(spec));
    for _ in 0..pages {
        builder.add_page(&[id]);
    }
    builder.finish()
}

/// `pages` pages with no images at all.
pub fn pdf_without_images(pages: usize) -> Vec<u8> {
    let mut builder = Builder::new();
    for _ in 0..pages {
        builder.add_page(&[]);
    }
    builder.finish()
}

/// One page whose only image claims Flate but holds garbage.
pub fn pdf_with_corrupt_image() -> Vec<u8> {
    let mut builder = Builder::new();
    let mut stream = image_stream(&ImageSpec::rgb(16, 16));
    stream.set_content(b"definitely not zlib data".to_vec());
    let id = builder.add_image(stream);
    builder.add_page(&[id]);
    builder.finish()
}

/// One page with a regular image and a 1-bit stencil mask.
pub fn pdf_with_stencil_mask() -> Vec<u8> {
    let mut builder = Builder::new();
    let image = builder.add_image(image_stream(&ImageSpec::gray(8, 8)));

    let mut dict = Dictionary::new();
    dict.set("Type", name("XObject"));
    dict.set("Subtype", name("Image"));
    dict.set("Width", Object::Integer(8));
    dict.set("Height", Object::Integer(8));
    dict.set("ImageMask", Object::Boolean(true));
    dict.set("BitsPerComponent", Object::Integer(1));
    let mask = builder.add_image(Stream::new(dict, vec![0xAA; 8]));

    builder.add_page(&[image, mask]);
    builder.finish()
}

/// One page with an image, and a standard security handler named in the
/// trailer. The content itself is left in the clear.
pub fn pdf_with_encryption() -> Vec<u8> {
    let mut builder = Builder::new();
    let id = builder.add_image(image_stream(&ImageSpec::rgb(16, 16)));
    builder.add_page(&[id]);

    let mut encrypt = Dictionary::new();
    encrypt.set("Filter", name("Standard"));
    encrypt.set("V", Object::Integer(1));
    encrypt.set("R", Object::Integer(2));
    encrypt.set("O", Object::string_literal(vec![0u8; 32]));
    encrypt.set("U", Object::string_literal(vec![0u8; 32]));
    encrypt.set("P", Object::Integer(-4));
    let encrypt_id = builder.doc.add_object(Object::Dictionary(encrypt));
    builder
        .doc
        .trailer
        .set("Encrypt", Object::Reference(encrypt_id));
    builder.finish()
}
