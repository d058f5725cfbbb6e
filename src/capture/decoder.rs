use jpeg_decoder::Decoder;

use super::frame::{Frame, PixelFormat};
use crate::error::{Error, Result};

/// Tightly packed RGB24 image ready for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

pub fn decode_frame(frame: &Frame) -> Result<RgbImage> {
    let width = frame.meta.width as usize;
    let height = frame.meta.height as usize;
    let stride = frame.meta.stride as usize;
    let data = &frame.data[..];

    // Frames built by hand skip capture validation
    if let Some(row) = frame.meta.format.bytes_per_row(frame.meta.width) {
        if stride < row {
            return Err(Error::Decode(format!(
                "stride {} shorter than a {}-byte row",
                stride, row
            )));
        }
        let needed = frame
            .meta
            .format
            .min_len(stride, frame.meta.width, frame.meta.height)
            .unwrap_or(usize::MAX);
        if data.len() < needed {
            return Err(Error::Decode(format!(
                "payload holds {} bytes, layout needs {}",
                data.len(),
                needed
            )));
        }
    }

    let pixels = match frame.meta.format {
        PixelFormat::Mjpeg => return decode_jpeg(data),
        PixelFormat::Rgb24 => rows(data, stride, height)
            .flat_map(|row| row[..width * 3].iter().copied())
            .collect(),
        PixelFormat::Bgr24 => rows(data, stride, height)
            .flat_map(|row| row[..width * 3].chunks_exact(3).flat_map(|p| [p[2], p[1], p[0]]))
            .collect(),
        PixelFormat::Rgba32 => rows(data, stride, height)
            .flat_map(|row| row[..width * 4].chunks_exact(4).flat_map(|p| [p[0], p[1], p[2]]))
            .collect(),
        PixelFormat::Bgra32 => rows(data, stride, height)
            .flat_map(|row| row[..width * 4].chunks_exact(4).flat_map(|p| [p[2], p[1], p[0]]))
            .collect(),
        PixelFormat::Yuyv4 => {
            let mut out = Vec::with_capacity(width * height * 3);
            for row in rows(data, stride, height) {
                for x in 0..width {
                    let pair = &row[(x / 2) * 4..(x / 2) * 4 + 4];
                    let y = if x % 2 == 0 { pair[0] } else { pair[2] };
                    out.extend_from_slice(&yuv_to_rgb(y, pair[1], pair[3]));
                }
            }
            out
        }
        PixelFormat::Nv12 => {
            let chroma = &data[stride * height..];
            let mut out = Vec::with_capacity(width * height * 3);
            for (y_idx, row) in rows(data, stride, height).enumerate() {
                let uv_row = &chroma[(y_idx / 2) * stride..];
                for x in 0..width {
                    let uv = (x / 2) * 2;
                    out.extend_from_slice(&yuv_to_rgb(row[x], uv_row[uv], uv_row[uv + 1]));
                }
            }
            out
        }
    };

    Ok(RgbImage {
        width: frame.meta.width,
        height: frame.meta.height,
        pixels,
    })
}

fn rows(data: &[u8], stride: usize, height: usize) -> impl Iterator<Item = &[u8]> {
    (0..height).map(move |y| &data[y * stride..])
}

fn decode_jpeg(data: &[u8]) -> Result<RgbImage> {
    let mut decoder = Decoder::new(data);
    let pixels = decoder
        .decode()
        .map_err(|e| Error::Decode(e.to_string()))?;
    let info = decoder
        .info()
        .ok_or_else(|| Error::Decode("missing JPEG header".into()))?;

    let pixels = match info.pixel_format {
        jpeg_decoder::PixelFormat::RGB24 => pixels,
        jpeg_decoder::PixelFormat::L8 => pixels.iter().flat_map(|&l| [l, l, l]).collect(),
        other => return Err(Error::Decode(format!("unsupported JPEG layout {:?}", other))),
    };

    Ok(RgbImage {
        width: info.width as u32,
        height: info.height as u32,
        pixels,
    })
}

/// BT.601 limited range
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    let clamp = |x: i32| ((x + 128) >> 8).clamp(0, 255) as u8;
    [
        clamp(298 * c + 409 * e),
        clamp(298 * c - 100 * d - 208 * e),
        clamp(298 * c + 516 * d),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{FrameMetadata, RawCapture};
    use bytes::Bytes;

    fn frame(data: &[u8], w: u32, h: u32, format: PixelFormat) -> Frame {
        Frame::from_raw(&RawCapture::new(data, w, h, format), 0).expect("valid frame")
    }

    #[test]
    fn test_bgr_is_swapped() {
        let img = decode_frame(&frame(&[1, 2, 3, 4, 5, 6], 2, 1, PixelFormat::Bgr24)).unwrap();
        assert_eq!(img.pixels, vec![3, 2, 1, 6, 5, 4]);
    }

    #[test]
    fn test_stride_padding_is_stripped() {
        let data = [1, 2, 3, 0, 4, 5, 6];
        let raw = RawCapture::new(&data, 1, 2, PixelFormat::Rgb24).with_stride(4);
        let img = decode_frame(&Frame::from_raw(&raw, 0).unwrap()).unwrap();
        assert_eq!(img.pixels, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_rgba_drops_alpha() {
        let img = decode_frame(&frame(&[9, 8, 7, 255], 1, 1, PixelFormat::Rgba32)).unwrap();
        assert_eq!(img.pixels, vec![9, 8, 7]);
    }

    #[test]
    fn test_yuv_black_and_white() {
        // Y=16 is black, Y=235 is white, neutral chroma
        let img = decode_frame(&frame(&[16, 128, 235, 128], 2, 1, PixelFormat::Yuyv4)).unwrap();
        assert_eq!(img.pixels, vec![0, 0, 0, 255, 255, 255]);
    }

    #[test]
    fn test_nv12_gray() {
        let mut data = vec![235u8; 4];
        data.extend_from_slice(&[128, 128]);
        let img = decode_frame(&frame(&data, 2, 2, PixelFormat::Nv12)).unwrap();
        assert_eq!(img.pixels, vec![255; 12]);
    }

    fn unchecked(data: &'static [u8], width: u32, height: u32, stride: u32) -> Frame {
        Frame::new(
            Bytes::from_static(data),
            FrameMetadata {
                sequence: 1,
                width,
                height,
                stride,
                format: PixelFormat::Rgb24,
                device_timestamp: None,
            },
        )
    }

    #[test]
    fn test_short_payload_is_decode_error() {
        let err = decode_frame(&unchecked(&[1, 2, 3], 4, 4, 12)).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn test_narrow_stride_is_decode_error() {
        let err = decode_frame(&unchecked(&[0; 24], 2, 2, 3)).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn test_bad_jpeg_is_decode_error() {
        let err = decode_frame(&frame(&[0xFF, 0xD8, 0x00], 4, 4, PixelFormat::Mjpeg)).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }
}
