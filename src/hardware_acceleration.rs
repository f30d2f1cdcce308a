//! Hardware-accelerated decoding (feature `hardware`).
//!
//! A GPU decoder is an optional resource: the FFmpeg build may not include
//! the device type, the driver may be missing, or the camera's codec may
//! not be supported by the device. Every one of those cases degrades to
//! software decoding with a warning rather than failing the run.
//!
//! The device context is owned by a [`HardwareDevice`] guard. The decoder
//! takes its own reference when the device is attached, and the guard drops
//! ours on every exit path, including early returns on error.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::ptr;
use std::str::FromStr;

use ffmpeg_next::{
    codec::context::Context as CodecContext, decoder::Video as VideoDecoder,
    frame::Video as VideoFrame,
};
use ffmpeg_sys_next::{
    AV_CODEC_HW_CONFIG_METHOD_HW_DEVICE_CTX, AVBufferRef, AVCodecHWConfig, AVHWDeviceType,
};

use crate::error::ExtractError;

/// Hardware decode policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HardwareAccelerationMode {
    /// Use the first device the codec supports, else software.
    #[default]
    Auto,
    /// Never touch hardware.
    Software,
    /// Use this device type, else software.
    Specific(HardwareDeviceType),
}

/// Hardware device types the decoder knows how to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareDeviceType {
    /// NVIDIA CUDA / NVDEC.
    Cuda,
    /// VA-API (Intel and AMD on Linux).
    Vaapi,
    /// DirectX Video Acceleration 2.
    Dxva2,
    /// Direct3D 11.
    D3d11va,
    /// Apple VideoToolbox.
    VideoToolbox,
    /// Intel Quick Sync.
    Qsv,
}

const DEVICE_TYPES: [(HardwareDeviceType, AVHWDeviceType, &str); 6] = [
    (HardwareDeviceType::Cuda, AVHWDeviceType::AV_HWDEVICE_TYPE_CUDA, "cuda"),
    (HardwareDeviceType::Vaapi, AVHWDeviceType::AV_HWDEVICE_TYPE_VAAPI, "vaapi"),
    (HardwareDeviceType::Dxva2, AVHWDeviceType::AV_HWDEVICE_TYPE_DXVA2, "dxva2"),
    (HardwareDeviceType::D3d11va, AVHWDeviceType::AV_HWDEVICE_TYPE_D3D11VA, "d3d11va"),
    (
        HardwareDeviceType::VideoToolbox,
        AVHWDeviceType::AV_HWDEVICE_TYPE_VIDEOTOOLBOX,
        "videotoolbox",
    ),
    (HardwareDeviceType::Qsv, AVHWDeviceType::AV_HWDEVICE_TYPE_QSV, "qsv"),
];

impl HardwareDeviceType {
    fn to_av_hw_device_type(self) -> AVHWDeviceType {
        DEVICE_TYPES
            .iter()
            .find(|(device, _, _)| *device == self)
            .map_or(AVHWDeviceType::AV_HWDEVICE_TYPE_NONE, |(_, av_type, _)| *av_type)
    }

    fn from_av_hw_device_type(av_type: AVHWDeviceType) -> Option<Self> {
        DEVICE_TYPES
            .iter()
            .find(|(_, candidate, _)| *candidate == av_type)
            .map(|(device, _, _)| *device)
    }

    /// Lower-case FFmpeg name (`cuda`, `vaapi`, ...).
    pub fn name(self) -> &'static str {
        DEVICE_TYPES
            .iter()
            .find(|(device, _, _)| *device == self)
            .map_or("unknown", |(_, _, name)| *name)
    }
}

impl Display for HardwareDeviceType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.name())
    }
}

impl FromStr for HardwareAccelerationMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let lowered = value.to_ascii_lowercase();
        match lowered.as_str() {
            "auto" | "gpu" => return Ok(HardwareAccelerationMode::Auto),
            "software" | "sw" | "cpu" | "none" => return Ok(HardwareAccelerationMode::Software),
            _ => {}
        }
        DEVICE_TYPES
            .iter()
            .find(|(_, _, name)| *name == lowered)
            .map(|(device, _, _)| HardwareAccelerationMode::Specific(*device))
            .ok_or_else(|| format!("unknown hardware mode: {value}"))
    }
}

/// Device types compiled into the linked FFmpeg build.
///
/// Compiled-in does not mean usable: creating the device can still fail
/// when the driver or GPU is absent.
pub fn available_hardware_devices() -> Vec<HardwareDeviceType> {
    let mut devices = Vec::new();
    let mut device_type = AVHWDeviceType::AV_HWDEVICE_TYPE_NONE;

    loop {
        device_type = unsafe { ffmpeg_sys_next::av_hwdevice_iterate_types(device_type) };
        if device_type == AVHWDeviceType::AV_HWDEVICE_TYPE_NONE {
            break;
        }
        if let Some(device) = HardwareDeviceType::from_av_hw_device_type(device_type) {
            devices.push(device);
        }
    }

    devices
}

/// Owned reference to an FFmpeg hardware device context.
pub(crate) struct HardwareDevice {
    context: *mut AVBufferRef,
    device_type: AVHWDeviceType,
}

impl HardwareDevice {
    fn create(device_type: AVHWDeviceType) -> Result<Self, ExtractError> {
        let mut context: *mut AVBufferRef = ptr::null_mut();
        let result = unsafe {
            ffmpeg_sys_next::av_hwdevice_ctx_create(
                &mut context,
                device_type,
                ptr::null(),
                ptr::null_mut(),
                0,
            )
        };

        if result < 0 || context.is_null() {
            Err(ExtractError::DecodeFailure(format!(
                "Failed to create {device_type:?} device context (result={result})"
            )))
        } else {
            Ok(Self {
                context,
                device_type,
            })
        }
    }

    /// Give the codec context its own reference to this device.
    fn attach(&self, codec_context: &mut CodecContext) {
        unsafe {
            let raw = codec_context.as_mut_ptr();
            (*raw).hw_device_ctx = ffmpeg_sys_next::av_buffer_ref(self.context);
        }
    }
}

impl Drop for HardwareDevice {
    fn drop(&mut self) {
        log::trace!("Releasing {:?} device reference", self.device_type);
        unsafe { ffmpeg_sys_next::av_buffer_unref(&mut self.context) };
    }
}

/// Result of trying to open a hardware decoder.
pub(crate) struct HardwareDecoderSetup {
    pub decoder: VideoDecoder,
    pub device: Option<HardwareDeviceType>,
}

/// Open a decoder for `codec_context`, on hardware when `mode` allows and
/// the codec supports it.
///
/// `reopen` produces a fresh codec context for the software fallback,
/// since opening a decoder consumes the context.
pub(crate) fn try_create_hardware_decoder(
    mut codec_context: CodecContext,
    mode: HardwareAccelerationMode,
    reopen: impl Fn() -> Result<CodecContext, ExtractError>,
) -> Result<HardwareDecoderSetup, ExtractError> {
    let candidate = match mode {
        HardwareAccelerationMode::Software => None,
        HardwareAccelerationMode::Auto => first_supported_device(&codec_context),
        HardwareAccelerationMode::Specific(device) => {
            let av_type = device.to_av_hw_device_type();
            codec_supports(&codec_context, av_type).then_some(av_type)
        }
    };

    let Some(av_type) = candidate else {
        if mode != HardwareAccelerationMode::Software {
            log::info!("No usable hardware decoder for this codec, decoding in software");
        }
        return Ok(HardwareDecoderSetup {
            decoder: codec_context.decoder().video()?,
            device: None,
        });
    };

    let device = match HardwareDevice::create(av_type) {
        Ok(device) => device,
        Err(error) => {
            log::warn!("{error}; falling back to software decoding");
            return Ok(HardwareDecoderSetup {
                decoder: codec_context.decoder().video()?,
                device: None,
            });
        }
    };

    device.attach(&mut codec_context);
    match codec_context.decoder().video() {
        Ok(decoder) => {
            log::info!("Hardware decoding enabled on {av_type:?}");
            Ok(HardwareDecoderSetup {
                decoder,
                device: HardwareDeviceType::from_av_hw_device_type(av_type),
            })
        }
        Err(error) => {
            log::warn!("Hardware decoder failed to open ({error}); using software");
            Ok(HardwareDecoderSetup {
                decoder: reopen()?.decoder().video()?,
                device: None,
            })
        }
    }
}

/// Copy a GPU-resident frame into system memory.
///
/// Returns `Ok(None)` when the frame already lives in system memory.
pub(crate) fn transfer_hardware_frame(
    frame: &VideoFrame,
) -> Result<Option<VideoFrame>, ExtractError> {
    let on_device = unsafe { !(*frame.as_ptr()).hw_frames_ctx.is_null() };
    if !on_device {
        return Ok(None);
    }

    let mut software_frame = VideoFrame::empty();
    let result = unsafe {
        ffmpeg_sys_next::av_hwframe_transfer_data(software_frame.as_mut_ptr(), frame.as_ptr(), 0)
    };
    if result < 0 {
        return Err(ExtractError::DecodeFailure(format!(
            "Hardware frame transfer failed (result={result})"
        )));
    }

    unsafe {
        ffmpeg_sys_next::av_frame_copy_props(software_frame.as_mut_ptr(), frame.as_ptr());
    }
    Ok(Some(software_frame))
}

fn hardware_configs(codec_context: &CodecContext) -> Vec<AVHWDeviceType> {
    // Contexts built from stream parameters carry only the codec id.
    let codec = unsafe { ffmpeg_sys_next::avcodec_find_decoder((*codec_context.as_ptr()).codec_id) };
    if codec.is_null() {
        return Vec::new();
    }

    let mut device_types = Vec::new();
    for index in 0.. {
        let config: *const AVCodecHWConfig =
            unsafe { ffmpeg_sys_next::avcodec_get_hw_config(codec, index) };
        if config.is_null() {
            break;
        }
        let (methods, device_type) = unsafe { ((*config).methods, (*config).device_type) };
        if methods & (AV_CODEC_HW_CONFIG_METHOD_HW_DEVICE_CTX as i32) != 0
            && device_type != AVHWDeviceType::AV_HWDEVICE_TYPE_NONE
        {
            device_types.push(device_type);
        }
    }
    device_types
}

fn first_supported_device(codec_context: &CodecContext) -> Option<AVHWDeviceType> {
    hardware_configs(codec_context).into_iter().next()
}

fn codec_supports(codec_context: &CodecContext, device_type: AVHWDeviceType) -> bool {
    hardware_configs(codec_context).contains(&device_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_modes() {
        assert_eq!(
            "auto".parse::<HardwareAccelerationMode>(),
            Ok(HardwareAccelerationMode::Auto)
        );
        assert_eq!(
            "CPU".parse::<HardwareAccelerationMode>(),
            Ok(HardwareAccelerationMode::Software)
        );
        assert_eq!(
            "cuda".parse::<HardwareAccelerationMode>(),
            Ok(HardwareAccelerationMode::Specific(HardwareDeviceType::Cuda))
        );
        assert!("opencl".parse::<HardwareAccelerationMode>().is_err());
    }

    #[test]
    fn device_names_round_trip() {
        for (device, _, name) in DEVICE_TYPES {
            assert_eq!(device.name(), name);
            assert_eq!(
                name.parse::<HardwareAccelerationMode>(),
                Ok(HardwareAccelerationMode::Specific(device))
            );
        }
    }
}
