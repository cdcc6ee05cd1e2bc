use std::io::Cursor;
use std::path::Path;

use image::ImageDecoder;
use pdf_writer::{Filter, Pdf, Ref};

use crate::error::Error;
use crate::model::{EmbeddedImage, ImageFormat};

/// Sniff and size an image without decoding JPEG pixel data; JPEGs are
/// passed through to the PDF as-is.
pub fn decode_image(data: Vec<u8>) -> Result<EmbeddedImage, Error> {
    match image::guess_format(&data)? {
        image::ImageFormat::Jpeg => {
            let decoder = image::codecs::jpeg::JpegDecoder::new(Cursor::new(&data))?;
            let (pixel_width, pixel_height) = decoder.dimensions();
            let components = match decoder.color_type() {
                image::ColorType::L8 => 1,
                image::ColorType::Rgb8 => 3,
                other => {
                    return Err(Error::InvalidInput(format!(
                        "unsupported JPEG color type {other:?}"
                    )));
                }
            };
            Ok(EmbeddedImage {
                data,
                format: ImageFormat::Jpeg,
                pixel_width,
                pixel_height,
                components,
            })
        }
        image::ImageFormat::Png => {
            let decoder = image::codecs::png::PngDecoder::new(Cursor::new(&data))?;
            let (pixel_width, pixel_height) = decoder.dimensions();
            Ok(EmbeddedImage {
                data,
                format: ImageFormat::Png,
                pixel_width,
                pixel_height,
                components: 3,
            })
        }
        other => Err(Error::InvalidInput(format!(
            "unsupported image format {other:?}"
        ))),
    }
}

pub fn load_image_file(path: &Path) -> Result<EmbeddedImage, Error> {
    let data = std::fs::read(path).map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {}", e, path.display()),
        ))
    })?;
    decode_image(data)
}

/// Write an image XObject. PNGs are decoded and re-compressed with Flate,
/// with an SMask when any pixel is translucent.
pub(super) fn embed_image(
    pdf: &mut Pdf,
    alloc: &mut impl FnMut() -> Ref,
    img: &EmbeddedImage,
) -> Result<Ref, Error> {
    let xobj_ref = alloc();

    match img.format {
        ImageFormat::Jpeg => {
            let mut xobj = pdf.image_xobject(xobj_ref, &img.data);
            xobj.filter(Filter::DctDecode);
            xobj.width(img.pixel_width as i32);
            xobj.height(img.pixel_height as i32);
            if img.components == 1 {
                xobj.color_space().device_gray();
            } else {
                xobj.color_space().device_rgb();
            }
            xobj.bits_per_component(8);
        }
        ImageFormat::Png => {
            let decoded = image::load_from_memory_with_format(&img.data, image::ImageFormat::Png)?;
            let rgba: image::RgbaImage = decoded.to_rgba8();
            let (w, h) = (rgba.width(), rgba.height());
            let has_alpha = rgba.pixels().any(|p| p.0[3] < 255);

            let rgb_data: Vec<u8> = rgba
                .pixels()
                .flat_map(|p| [p.0[0], p.0[1], p.0[2]])
                .collect();
            let compressed_rgb = miniz_oxide::deflate::compress_to_vec_zlib(&rgb_data, 6);

            let smask_ref = if has_alpha {
                let alpha_data: Vec<u8> = rgba.pixels().map(|p| p.0[3]).collect();
                let compressed_alpha = miniz_oxide::deflate::compress_to_vec_zlib(&alpha_data, 6);
                let mask_ref = alloc();
                let mut mask = pdf.image_xobject(mask_ref, &compressed_alpha);
                mask.filter(Filter::FlateDecode);
                mask.width(w as i32);
                mask.height(h as i32);
                mask.color_space().device_gray();
                mask.bits_per_component(8);
                Some(mask_ref)
            } else {
                None
            };

            let mut xobj = pdf.image_xobject(xobj_ref, &compressed_rgb);
            xobj.filter(Filter::FlateDecode);
            xobj.width(w as i32);
            xobj.height(h as i32);
            xobj.color_space().device_rgb();
            xobj.bits_per_component(8);
            if let Some(mask_ref) = smask_ref {
                xobj.s_mask(mask_ref);
            }
        }
    }

    Ok(xobj_ref)
}
