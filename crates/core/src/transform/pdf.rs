//! lopdf-backed transformer.

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::codec::{self, DecodeIssue, EncodedImage};
use super::colorspace::ColorSpace;
use super::error::TransformError;
use super::objects::{encoding_label, filters, get_bool, get_dict, get_int, get_name};
use super::traits::Transformer;
use super::types::{ColorMode, ImageRewrite, ImageUnit, TransformProgress, TransformReport};
use crate::job::{CancelFlag, JobParams};

const MAX_PARENT_DEPTH: usize = 32;

/// Entries describing the old encoding, dropped from rewritten images.
const REWRITTEN_KEYS: [&[u8]; 6] = [
    b"Filter",
    b"DecodeParms",
    b"Decode",
    b"Length",
    b"ColorSpace",
    b"BitsPerComponent",
];

/// Rewrites image XObjects in place and saves the document.
///
/// Images are found through page resources, including resources of nested
/// form XObjects and resources inherited from the page tree. Each image is
/// visited once even when several pages share it. Stencil masks are left
/// alone; soft masks stay attached by reference.
#[derive(Debug, Clone, Default)]
pub struct PdfTransformer;

impl PdfTransformer {
    pub fn new() -> Self {
        Self
    }
}

struct ImageRef {
    id: ObjectId,
    page: u32,
}

struct Inventory {
    images: Vec<ImageRef>,
    stencil_masks: usize,
}

fn load_document(path: &Path) -> Result<Document, TransformError> {
    let doc = Document::load(path).map_err(|e| TransformError::invalid(e.to_string()))?;
    if doc.trailer.get(b"Encrypt").is_ok() {
        return Err(TransformError::Encrypted);
    }
    if doc.get_pages().is_empty() {
        return Err(TransformError::invalid("document has no pages"));
    }
    Ok(doc)
}

fn inventory(doc: &Document) -> Inventory {
    let mut walk = Walk {
        doc,
        seen: HashSet::new(),
        inventory: Inventory {
            images: Vec::new(),
            stencil_masks: 0,
        },
    };
    for (page_no, page_id) in doc.get_pages() {
        if let Some(resources) = page_resources(doc, page_id) {
            walk.visit_resources(resources, page_no);
        }
    }
    walk.inventory
}

/// Resources of a page, inherited from the nearest ancestor when absent.
fn page_resources(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut node = doc.get_object(page_id).ok()?.as_dict().ok()?;
    for _ in 0..MAX_PARENT_DEPTH {
        if let Some(resources) = get_dict(doc, node, b"Resources") {
            return Some(resources);
        }
        node = get_dict(doc, node, b"Parent")?;
    }
    None
}

struct Walk<'a> {
    doc: &'a Document,
    seen: HashSet<ObjectId>,
    inventory: Inventory,
}

impl<'a> Walk<'a> {
    fn visit_resources(&mut self, resources: &'a Dictionary, page: u32) {
        let Some(xobjects) = get_dict(self.doc, resources, b"XObject") else {
            return;
        };
        for (_, entry) in xobjects.iter() {
            let Object::Reference(id) = entry else {
                continue;
            };
            if !self.seen.insert(*id) {
                continue;
            }
            let Ok(Object::Stream(stream)) = self.doc.get_object(*id) else {
                continue;
            };
            match get_name(self.doc, &stream.dict, b"Subtype") {
                Some(b"Image") => {
                    if get_bool(self.doc, &stream.dict, b"ImageMask") {
                        self.inventory.stencil_masks += 1;
                    } else {
                        self.inventory.images.push(ImageRef { id: *id, page });
                    }
                }
                Some(b"Form") => {
                    if let Some(nested) = get_dict(self.doc, &stream.dict, b"Resources") {
                        self.visit_resources(nested, page);
                    }
                }
                _ => {}
            }
        }
    }
}

fn describe(doc: &Document, image: &ImageRef, stream: &Stream) -> ImageUnit {
    let dim = |key: &[u8]| get_int(doc, &stream.dict, key).unwrap_or(0).max(0) as u32;
    let chain = filters(doc, &stream.dict);
    let color = match stream.dict.get(b"ColorSpace") {
        Ok(obj) => ColorSpace::resolve(doc, obj).ok().map(|cs| cs.mode()),
        Err(_) if chain.iter().any(|f| f == "DCTDecode") => Some(ColorMode::Rgb),
        Err(_) => None,
    };
    ImageUnit {
        object_id: image.id,
        page: image.page,
        width: dim(b"Width"),
        height: dim(b"Height"),
        color,
        encoding: encoding_label(&chain),
        bytes: stream.content.len(),
    }
}

/// Builds the replacement stream, keeping unrelated entries such as `SMask`.
fn replacement_stream(original: &Stream, encoded: EncodedImage) -> Stream {
    let mut dict = original.dict.clone();
    for key in REWRITTEN_KEYS {
        dict.remove(key);
    }
    // Color-key masks refer to the old sample values.
    if matches!(dict.get(b"Mask"), Ok(Object::Array(_))) {
        dict.remove(b"Mask");
    }

    dict.set("Type", Object::Name(b"XObject".to_vec()));
    dict.set("Subtype", Object::Name(b"Image".to_vec()));
    dict.set("Width", Object::Integer(encoded.width as i64));
    dict.set("Height", Object::Integer(encoded.height as i64));
    dict.set(
        "ColorSpace",
        Object::Name(encoded.color.device_space().as_bytes().to_vec()),
    );
    dict.set("BitsPerComponent", Object::Integer(8));
    dict.set("Filter", Object::Name(encoded.filter.as_bytes().to_vec()));
    dict.set("Length", Object::Integer(encoded.data.len() as i64));
    Stream::new(dict, encoded.data)
}

fn rewrite_image(
    doc: &Document,
    image: &ImageRef,
    params: &JobParams,
) -> Result<(Stream, ImageRewrite), TransformError> {
    let stream = match doc.get_object(image.id) {
        Ok(Object::Stream(stream)) => stream,
        _ => {
            return Err(TransformError::invalid(format!(
                "image {} {} R is not a stream",
                image.id.0, image.id.1
            )))
        }
    };
    let source_unit = describe(doc, image, stream);

    let source = codec::decode(doc, stream).map_err(|issue| match issue {
        DecodeIssue::Unsupported(reason) => TransformError::unsupported(image.id, reason),
        DecodeIssue::Corrupt(reason) => TransformError::decode(image.id, reason),
    })?;
    let encoded = codec::encode(source.image, params)
        .map_err(|reason| TransformError::encode(image.id, reason))?;

    let rewrite = ImageRewrite {
        width: encoded.width,
        height: encoded.height,
        color: encoded.color,
        encoding: encoded.filter.to_string(),
        bytes: encoded.data.len(),
        source: ImageUnit {
            color: source_unit.color.or(Some(source.color)),
            ..source_unit
        },
    };
    Ok((replacement_stream(stream, encoded), rewrite))
}

impl Transformer for PdfTransformer {
    fn name(&self) -> &str {
        "pdf"
    }

    fn transform(
        &self,
        input: &Path,
        output: &Path,
        params: &JobParams,
        progress_tx: &mpsc::Sender<TransformProgress>,
        cancel: &CancelFlag,
    ) -> Result<TransformReport, TransformError> {
        let mut doc = load_document(input)?;
        let pages = doc.get_pages().len();
        let Inventory {
            images,
            stencil_masks,
        } = inventory(&doc);
        let total = images.len();

        info!(
            pages,
            images = total,
            stencil_masks,
            format = params.format.as_str(),
            "Transforming document"
        );

        if total == 0 {
            let _ = progress_tx.blocking_send(TransformProgress {
                images_done: 0,
                images_total: 0,
                page: None,
            });
        }

        let mut rewrites = Vec::with_capacity(total);
        for (index, image) in images.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(TransformError::Cancelled);
            }

            let (replacement, rewrite) = rewrite_image(&doc, image, params)?;
            debug!(
                object = image.id.0,
                page = image.page,
                width = rewrite.width,
                height = rewrite.height,
                bytes = rewrite.bytes,
                "Rewrote image"
            );
            doc.objects.insert(image.id, Object::Stream(replacement));
            rewrites.push(rewrite);

            let _ = progress_tx.blocking_send(TransformProgress {
                images_done: index + 1,
                images_total: total,
                page: Some(image.page),
            });
        }

        if cancel.is_cancelled() {
            return Err(TransformError::Cancelled);
        }

        let mut writer = BufWriter::new(File::create(output)?);
        doc.save_to(&mut writer)
            .map_err(|e| TransformError::Io(std::io::Error::other(e.to_string())))?;
        writer.flush()?;
        let output_bytes = std::fs::metadata(output)?.len();

        Ok(TransformReport {
            pages,
            images: rewrites,
            skipped_masks: stencil_masks,
            output_bytes,
        })
    }

    fn inspect(&self, input: &Path) -> Result<Vec<ImageUnit>, TransformError> {
        let doc = load_document(input)?;
        let units = inventory(&doc)
            .images
            .iter()
            .filter_map(|image| match doc.get_object(image.id) {
                Ok(Object::Stream(stream)) => Some(describe(&doc, image, stream)),
                _ => None,
            })
            .collect();
        Ok(units)
    }
}
