use std::{
    env::{self, VarError},
    panic::catch_unwind,
    process,
};

use anyhow::{anyhow, bail};
use once_cell::sync::Lazy;

use super::{Image, PixelFormat};

/// Supported JPEG decoders, selected via `HANDMARK_JPEG_BACKEND`.
#[derive(Debug)]
enum JpegBackend {
    /// `mozjpeg`, bindings to Mozilla's libjpeg fork. Fastest of the three.
    MozJpeg,
    /// `zune-jpeg`, a pure-Rust decoder.
    ZuneJpeg,
    /// `jpeg-decoder`, a slow but robust pure-Rust decoder.
    JpegDecoder,
}

const DEFAULT_BACKEND: JpegBackend = JpegBackend::MozJpeg;

static JPEG_BACKEND: Lazy<JpegBackend> = Lazy::new(|| {
    let backend = match env::var("HANDMARK_JPEG_BACKEND") {
        Ok(v) if v == "mozjpeg" => JpegBackend::MozJpeg,
        Ok(v) if v == "zune-jpeg" => JpegBackend::ZuneJpeg,
        Ok(v) if v == "jpeg-decoder" => JpegBackend::JpegDecoder,
        Ok(v) => {
            eprintln!("invalid value set for `HANDMARK_JPEG_BACKEND` variable: '{v}'; exiting");
            process::exit(1);
        }
        Err(VarError::NotPresent) => DEFAULT_BACKEND,
        Err(VarError::NotUnicode(s)) => {
            eprintln!(
                "invalid value set for `HANDMARK_JPEG_BACKEND` variable: {}; exiting",
                s.to_string_lossy()
            );
            process::exit(1);
        }
    };
    log::debug!("using JPEG decode backend: {:?}", backend);
    backend
});

pub(super) fn decode(data: &[u8]) -> anyhow::Result<Image> {
    match *JPEG_BACKEND {
        JpegBackend::MozJpeg => decode_mozjpeg(data),
        JpegBackend::ZuneJpeg => decode_zune(data),
        JpegBackend::JpegDecoder => decode_jpeg_decoder(data),
    }
}

fn decode_mozjpeg(data: &[u8]) -> anyhow::Result<Image> {
    // mozjpeg reports errors by panicking
    let (buf, width, height) = catch_unwind(|| -> anyhow::Result<_> {
        let mut decompress = mozjpeg::Decompress::new_mem(data)?;
        decompress.do_fancy_upsampling(false);
        decompress.dct_method(mozjpeg::DctMethod::IntegerFast);

        let mut decompress = decompress.rgba()?;
        let buf = decompress
            .read_scanlines_flat()
            .ok_or_else(|| anyhow!("failed to decode image"))?;
        Ok((buf, decompress.width(), decompress.height()))
    })
    .map_err(|payload| match payload.downcast::<String>() {
        Ok(msg) => anyhow::Error::msg(*msg),
        Err(_) => anyhow!("mozjpeg panicked while decoding"),
    })??;

    Image::from_raw(
        width.try_into()?,
        height.try_into()?,
        PixelFormat::Rgba,
        buf,
    )
}

fn decode_zune(data: &[u8]) -> anyhow::Result<Image> {
    use zune_jpeg::zune_core::colorspace::ColorSpace;
    use zune_jpeg::zune_core::options::DecoderOptions;

    let mut decoder = zune_jpeg::JpegDecoder::new_with_options(
        DecoderOptions::new_fast().jpeg_set_out_colorspace(ColorSpace::RGBA),
        data,
    );
    decoder.decode_headers()?;
    match decoder.get_output_colorspace() {
        Some(ColorSpace::RGBA) => {}
        other => bail!("unsupported output colorspace {other:?} (expected RGBA)"),
    }

    let size = decoder
        .output_buffer_size()
        .ok_or_else(|| anyhow!("JPEG headers were not decoded"))?;
    let mut buf = vec![0; size];
    decoder.decode_into(&mut buf)?;
    let (width, height) = decoder
        .dimensions()
        .ok_or_else(|| anyhow!("JPEG headers were not decoded"))?;
    Image::from_raw(width.into(), height.into(), PixelFormat::Rgba, buf)
}

fn decode_jpeg_decoder(data: &[u8]) -> anyhow::Result<Image> {
    let mut decoder = jpeg_decoder::Decoder::new(data);
    let pixels = decoder.decode()?;
    let info = decoder
        .info()
        .ok_or_else(|| anyhow!("JPEG decoder produced no image info"))?;
    let (width, height) = (info.width.into(), info.height.into());

    match info.pixel_format {
        jpeg_decoder::PixelFormat::RGB24 => {
            Image::from_raw(width, height, PixelFormat::Rgb, pixels)
                .map(|image| image.to_format(PixelFormat::Rgba))
        }
        jpeg_decoder::PixelFormat::L8 => {
            let rgba = pixels.iter().flat_map(|&l| [l, l, l, 255]).collect();
            Image::from_raw(width, height, PixelFormat::Rgba, rgba)
        }
        format => bail!("unsupported JPEG pixel format {format:?}"),
    }
}
