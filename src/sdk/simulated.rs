//! In-process simulation of the camera SDK.
//!
//! `SimulatedSdk` behaves like a small bus of GenICam cameras. Frames are
//! deterministic sensor noise so tests and demos are reproducible. Every
//! SDK call is counted and every handle is tracked, which lets tests
//! assert that a session leaks nothing and stays silent when it should.
//!
//! Clones share the same bus, so two sessions built from clones of one
//! `SimulatedSdk` compete for the same cameras.

use super::{
    CameraDevice, CameraList, CameraSdk, CameraSystem, ConvertedImage, NodeAccess, NodeMap,
    RawImage, SdkError, SdkResult,
};
use crate::capture::PixelFormat;
use rand_chacha::ChaCha8Rng;
use rand_core::{RngCore, SeedableRng};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// GenICam feature names served by the simulated node map.
pub mod features {
    pub const PIXEL_FORMAT: &str = "PixelFormat";
    pub const OFFSET_X: &str = "OffsetX";
    pub const OFFSET_Y: &str = "OffsetY";
    pub const WIDTH: &str = "Width";
    pub const HEIGHT: &str = "Height";
}

/// Spinnaker's generic error code, used for injected failures.
const ERR_ERROR: i32 = -1001;
/// Spinnaker's "not initialized" error code.
const ERR_NOT_INITIALIZED: i32 = -1002;

/// SDK entry points, for call accounting and fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum SdkCall {
    AcquireSystem,
    ReleaseSystem,
    CreateList,
    ListSize,
    ListGet,
    ClearList,
    DestroyList,
    CameraInit,
    CameraDeinit,
    CameraRelease,
    /// Any node read, including access and bounds queries.
    NodeRead,
    NodeWrite,
    BeginAcquisition,
    EndAcquisition,
    NextImage,
    ImageIncomplete,
    ConvertImage,
    ReleaseImage,
}

/// Static description of a simulated camera.
#[derive(Debug, Clone)]
pub struct SimulatedCamera {
    pub serial: String,
    pub min_width: i64,
    pub max_width: i64,
    pub min_height: i64,
    pub max_height: i64,
    /// Formats listed as available on the `PixelFormat` node.
    pub supported_formats: Vec<PixelFormat>,
    /// Row alignment, in bytes, of converted Mono8 images.
    pub stride_alignment: usize,
    /// Time each poll blocks before returning a frame.
    pub frame_interval: Option<Duration>,
    /// Access overrides keyed by node name.
    pub node_access: HashMap<String, NodeAccess>,
}

impl Default for SimulatedCamera {
    fn default() -> Self {
        Self {
            serial: "19000001".to_string(),
            min_width: 1,
            max_width: 1280,
            min_height: 1,
            max_height: 1024,
            supported_formats: PixelFormat::ALL.to_vec(),
            stride_alignment: 1,
            frame_interval: None,
            node_access: HashMap::new(),
        }
    }
}

impl SimulatedCamera {
    /// A camera with the given sensor size.
    pub fn with_sensor(max_width: i64, max_height: i64) -> Self {
        Self {
            max_width,
            max_height,
            ..Default::default()
        }
    }
}

/// Node values currently applied on a simulated camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraSettings {
    pub pixel_format: PixelFormat,
    pub offset_x: i64,
    pub offset_y: i64,
    pub width: i64,
    pub height: i64,
}

/// Handles that have been handed out and not yet released.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Outstanding {
    pub systems: usize,
    pub lists: usize,
    pub cameras: usize,
    pub images: usize,
}

impl Outstanding {
    /// True if every handle has been released.
    pub fn is_clean(&self) -> bool {
        *self == Outstanding::default()
    }
}

#[derive(Debug)]
struct CameraState {
    spec: SimulatedCamera,
    settings: CameraSettings,
    claimed: bool,
    acquiring: bool,
    frames: u64,
}

impl CameraState {
    fn new(spec: SimulatedCamera) -> Self {
        let settings = CameraSettings {
            pixel_format: PixelFormat::Mono8,
            offset_x: 0,
            offset_y: 0,
            width: spec.max_width,
            height: spec.max_height,
        };
        Self {
            spec,
            settings,
            claimed: false,
            acquiring: false,
            frames: 0,
        }
    }

    fn access(&self, name: &str) -> SdkResult<NodeAccess> {
        if !matches!(
            name,
            features::PIXEL_FORMAT
                | features::OFFSET_X
                | features::OFFSET_Y
                | features::WIDTH
                | features::HEIGHT
        ) {
            return Err(SdkError::NotFound(name.to_string()));
        }
        let mut access = self
            .spec
            .node_access
            .get(name)
            .copied()
            .unwrap_or(NodeAccess::READ_WRITE);
        // Image format nodes lock while streaming.
        if self.acquiring {
            access.writable = false;
        }
        Ok(access)
    }

    fn bounds(&self, name: &str) -> SdkResult<(i64, i64)> {
        let s = &self.settings;
        let spec = &self.spec;
        match name {
            features::WIDTH => Ok((spec.min_width, spec.max_width - s.offset_x)),
            features::HEIGHT => Ok((spec.min_height, spec.max_height - s.offset_y)),
            features::OFFSET_X => Ok((0, spec.max_width - s.width)),
            features::OFFSET_Y => Ok((0, spec.max_height - s.height)),
            other => Err(SdkError::InvalidArgument(format!(
                "{other} is not an integer node"
            ))),
        }
    }

    fn set_integer(&mut self, name: &str, value: i64) -> SdkResult<()> {
        if !self.access(name)?.is_available_and_writable() {
            return Err(SdkError::AccessDenied(name.to_string()));
        }
        let (min, max) = self.bounds(name)?;
        if value < min || value > max {
            return Err(SdkError::InvalidArgument(format!(
                "{name}={value} outside [{min}, {max}]"
            )));
        }
        match name {
            features::WIDTH => self.settings.width = value,
            features::HEIGHT => self.settings.height = value,
            features::OFFSET_X => self.settings.offset_x = value,
            _ => self.settings.offset_y = value,
        }
        Ok(())
    }
}

/// GenICam PFNC code for a pixel format.
fn pfnc_code(format: PixelFormat) -> i64 {
    match format {
        PixelFormat::Mono8 => 0x0108_0001,
        PixelFormat::Mono10 => 0x0110_0003,
        PixelFormat::Mono12 => 0x0110_0005,
        PixelFormat::Mono14 => 0x0110_0025,
        PixelFormat::Mono16 => 0x0110_0007,
    }
}

#[derive(Debug, Default)]
struct Faults {
    failures: HashMap<SdkCall, usize>,
    timeouts: usize,
    incomplete: usize,
}

fn take_one(counter: &mut usize) -> bool {
    if *counter > 0 {
        *counter -= 1;
        true
    } else {
        false
    }
}

#[derive(Debug)]
struct Bus {
    cameras: Vec<CameraState>,
    faults: Faults,
    calls: HashMap<SdkCall, usize>,
    outstanding: Outstanding,
    rng: ChaCha8Rng,
}

impl Bus {
    /// Counts a call and returns the injected failure for it, if one is queued.
    fn record(&mut self, call: SdkCall) -> SdkResult<()> {
        *self.calls.entry(call).or_insert(0) += 1;
        if let Some(remaining) = self.faults.failures.get_mut(&call) {
            if take_one(remaining) {
                return Err(SdkError::Failure {
                    code: ERR_ERROR,
                    context: format!("injected failure in {call:?}"),
                });
            }
        }
        Ok(())
    }

    fn camera(&mut self, index: usize) -> SdkResult<&mut CameraState> {
        self.cameras
            .get_mut(index)
            .ok_or_else(|| SdkError::InvalidArgument(format!("no camera at index {index}")))
    }
}

/// Simulated SDK handle.
#[derive(Debug, Clone)]
pub struct SimulatedSdk {
    bus: Arc<Mutex<Bus>>,
}

impl Default for SimulatedSdk {
    fn default() -> Self {
        Self::new(vec![SimulatedCamera::default()])
    }
}

impl SimulatedSdk {
    /// A bus holding the given cameras.
    pub fn new(cameras: Vec<SimulatedCamera>) -> Self {
        Self::with_seed(cameras, 0)
    }

    /// A bus whose sensor noise is drawn from `seed`.
    pub fn with_seed(cameras: Vec<SimulatedCamera>, seed: u64) -> Self {
        let bus = Bus {
            cameras: cameras.into_iter().map(CameraState::new).collect(),
            faults: Faults::default(),
            calls: HashMap::new(),
            outstanding: Outstanding::default(),
            rng: ChaCha8Rng::seed_from_u64(seed),
        };
        Self {
            bus: Arc::new(Mutex::new(bus)),
        }
    }

    /// A bus with no cameras attached.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// A bus with `count` default cameras.
    pub fn with_cameras(count: usize) -> Self {
        let cameras = (0..count)
            .map(|i| SimulatedCamera {
                serial: format!("{}", 19_000_001 + i),
                ..Default::default()
            })
            .collect();
        Self::new(cameras)
    }

    fn bus(&self) -> MutexGuard<'_, Bus> {
        self.bus.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes the next `times` calls to `call` fail.
    pub fn fail_next(&self, call: SdkCall, times: usize) {
        *self.bus().faults.failures.entry(call).or_insert(0) += times;
    }

    /// Makes the next `times` polls time out.
    pub fn timeout_next(&self, times: usize) {
        self.bus().faults.timeouts += times;
    }

    /// Marks the next `times` frames as incomplete.
    pub fn incomplete_next(&self, times: usize) {
        self.bus().faults.incomplete += times;
    }

    /// Overrides the access mode of node `name` on camera `index`.
    pub fn set_node_access(&self, index: usize, name: &str, access: NodeAccess) {
        if let Some(camera) = self.bus().cameras.get_mut(index) {
            camera.spec.node_access.insert(name.to_string(), access);
        }
    }

    /// Attaches another camera to the bus.
    pub fn plug(&self, camera: SimulatedCamera) {
        self.bus().cameras.push(CameraState::new(camera));
    }

    /// Number of times `call` has been made.
    pub fn call_count(&self, call: SdkCall) -> usize {
        self.bus().calls.get(&call).copied().unwrap_or(0)
    }

    /// Total number of SDK calls made.
    pub fn total_calls(&self) -> usize {
        self.bus().calls.values().sum()
    }

    /// Handles currently held by callers.
    pub fn outstanding(&self) -> Outstanding {
        self.bus().outstanding
    }

    /// Node values applied on camera `index`.
    pub fn camera_settings(&self, index: usize) -> Option<CameraSettings> {
        self.bus().cameras.get(index).map(|c| c.settings)
    }

    /// True if camera `index` is initialized by some handle.
    pub fn is_claimed(&self, index: usize) -> bool {
        self.bus().cameras.get(index).is_some_and(|c| c.claimed)
    }

    /// True if camera `index` is streaming.
    pub fn is_acquiring(&self, index: usize) -> bool {
        self.bus().cameras.get(index).is_some_and(|c| c.acquiring)
    }

    /// Number of frames camera `index` has produced.
    pub fn frames_captured(&self, index: usize) -> u64 {
        self.bus().cameras.get(index).map_or(0, |c| c.frames)
    }
}

impl CameraSdk for SimulatedSdk {
    type System = SimulatedSystem;

    fn acquire_system(&mut self) -> SdkResult<SimulatedSystem> {
        let mut bus = self.bus();
        bus.record(SdkCall::AcquireSystem)?;
        bus.outstanding.systems += 1;
        Ok(SimulatedSystem {
            bus: Arc::clone(&self.bus),
        })
    }
}

/// Simulated system handle.
#[derive(Debug)]
pub struct SimulatedSystem {
    bus: Arc<Mutex<Bus>>,
}

fn lock(bus: &Arc<Mutex<Bus>>) -> MutexGuard<'_, Bus> {
    bus.lock().unwrap_or_else(PoisonError::into_inner)
}

impl CameraSystem for SimulatedSystem {
    type List = SimulatedCameraList;

    fn cameras(&mut self) -> SdkResult<SimulatedCameraList> {
        let mut bus = lock(&self.bus);
        bus.record(SdkCall::CreateList)?;
        bus.outstanding.lists += 1;
        Ok(SimulatedCameraList {
            bus: Arc::clone(&self.bus),
            indices: (0..bus.cameras.len()).collect(),
        })
    }

    fn release(self) -> SdkResult<()> {
        let mut bus = lock(&self.bus);
        bus.record(SdkCall::ReleaseSystem)?;
        bus.outstanding.systems -= 1;
        Ok(())
    }
}

/// Simulated camera list.
#[derive(Debug)]
pub struct SimulatedCameraList {
    bus: Arc<Mutex<Bus>>,
    indices: Vec<usize>,
}

impl CameraList for SimulatedCameraList {
    type Camera = SimulatedCameraHandle;

    fn len(&self) -> SdkResult<usize> {
        lock(&self.bus).record(SdkCall::ListSize)?;
        Ok(self.indices.len())
    }

    fn get(&self, index: usize) -> SdkResult<SimulatedCameraHandle> {
        let mut bus = lock(&self.bus);
        bus.record(SdkCall::ListGet)?;
        let camera = *self
            .indices
            .get(index)
            .ok_or_else(|| SdkError::InvalidArgument(format!("no camera at index {index}")))?;
        bus.outstanding.cameras += 1;
        Ok(SimulatedCameraHandle {
            nodes: SimulatedNodeMap {
                bus: Arc::clone(&self.bus),
                camera,
            },
            initialized: false,
        })
    }

    fn clear(&mut self) -> SdkResult<()> {
        lock(&self.bus).record(SdkCall::ClearList)?;
        self.indices.clear();
        Ok(())
    }

    fn destroy(self) -> SdkResult<()> {
        let mut bus = lock(&self.bus);
        bus.record(SdkCall::DestroyList)?;
        bus.outstanding.lists -= 1;
        Ok(())
    }
}

/// Simulated camera handle.
#[derive(Debug)]
pub struct SimulatedCameraHandle {
    nodes: SimulatedNodeMap,
    initialized: bool,
}

impl SimulatedCameraHandle {
    fn not_initialized(what: &str) -> SdkError {
        SdkError::Failure {
            code: ERR_NOT_INITIALIZED,
            context: format!("{what} on uninitialized camera"),
        }
    }
}

impl CameraDevice for SimulatedCameraHandle {
    type Nodes = SimulatedNodeMap;
    type Image = SimulatedImage;

    fn init(&mut self) -> SdkResult<()> {
        let mut bus = lock(&self.nodes.bus);
        bus.record(SdkCall::CameraInit)?;
        let camera = bus.camera(self.nodes.camera)?;
        if camera.claimed {
            return Err(SdkError::Busy(format!(
                "camera {} is in use",
                camera.spec.serial
            )));
        }
        camera.claimed = true;
        self.initialized = true;
        Ok(())
    }

    fn deinit(&mut self) -> SdkResult<()> {
        let mut bus = lock(&self.nodes.bus);
        bus.record(SdkCall::CameraDeinit)?;
        if !self.initialized {
            return Err(Self::not_initialized("deinit"));
        }
        let camera = bus.camera(self.nodes.camera)?;
        camera.claimed = false;
        camera.acquiring = false;
        self.initialized = false;
        Ok(())
    }

    fn node_map(&mut self) -> SdkResult<&mut SimulatedNodeMap> {
        if !self.initialized {
            return Err(Self::not_initialized("node map access"));
        }
        Ok(&mut self.nodes)
    }

    fn begin_acquisition(&mut self) -> SdkResult<()> {
        let mut bus = lock(&self.nodes.bus);
        bus.record(SdkCall::BeginAcquisition)?;
        if !self.initialized {
            return Err(Self::not_initialized("begin acquisition"));
        }
        bus.camera(self.nodes.camera)?.acquiring = true;
        Ok(())
    }

    fn end_acquisition(&mut self) -> SdkResult<()> {
        let mut bus = lock(&self.nodes.bus);
        bus.record(SdkCall::EndAcquisition)?;
        let camera = bus.camera(self.nodes.camera)?;
        if !camera.acquiring {
            return Err(SdkError::Failure {
                code: ERR_ERROR,
                context: "camera is not streaming".to_string(),
            });
        }
        camera.acquiring = false;
        Ok(())
    }

    fn next_image(&mut self) -> SdkResult<SimulatedImage> {
        let interval = {
            let mut bus = lock(&self.nodes.bus);
            bus.record(SdkCall::NextImage)?;
            if take_one(&mut bus.faults.timeouts) {
                return Err(SdkError::Timeout);
            }
            let camera = bus.camera(self.nodes.camera)?;
            if !camera.acquiring {
                return Err(SdkError::Failure {
                    code: ERR_ERROR,
                    context: "camera is not streaming".to_string(),
                });
            }
            camera.spec.frame_interval
        };
        // Block outside the lock, like a driver waiting on the wire.
        if let Some(interval) = interval {
            std::thread::sleep(interval);
        }

        let mut bus = lock(&self.nodes.bus);
        let incomplete = take_one(&mut bus.faults.incomplete);
        let (settings, alignment) = {
            let camera = bus.camera(self.nodes.camera)?;
            camera.frames += 1;
            (camera.settings, camera.spec.stride_alignment.max(1))
        };
        let width = usize::try_from(settings.width).unwrap_or(0);
        let height = usize::try_from(settings.height).unwrap_or(0);
        let format = settings.pixel_format;
        let stride = width * format.bytes_per_pixel();
        let data = sensor_noise(&mut bus.rng, format, width * height);
        bus.outstanding.images += 1;

        Ok(SimulatedImage {
            bus: Arc::clone(&self.nodes.bus),
            data,
            width,
            height,
            stride,
            format,
            incomplete,
            alignment,
        })
    }

    fn release(self) -> SdkResult<()> {
        let mut bus = lock(&self.nodes.bus);
        bus.record(SdkCall::CameraRelease)?;
        bus.outstanding.cameras -= 1;
        Ok(())
    }
}

/// Fills `pixels` little-endian samples within the format's bit depth.
fn sensor_noise(rng: &mut ChaCha8Rng, format: PixelFormat, pixels: usize) -> Vec<u8> {
    let mut data = vec![0u8; pixels * format.bytes_per_pixel()];
    rng.fill_bytes(&mut data);
    if format.bytes_per_pixel() == 2 {
        let high_mask = (u16::MAX >> (16 - format.bit_depth())).to_le_bytes()[1];
        for sample in data.chunks_exact_mut(2) {
            sample[1] &= high_mask;
        }
    }
    data
}

/// Node map of a simulated camera.
#[derive(Debug)]
pub struct SimulatedNodeMap {
    bus: Arc<Mutex<Bus>>,
    camera: usize,
}

impl NodeMap for SimulatedNodeMap {
    fn access(&self, name: &str) -> SdkResult<NodeAccess> {
        let mut bus = lock(&self.bus);
        bus.record(SdkCall::NodeRead)?;
        bus.camera(self.camera)?.access(name)
    }

    fn integer_bounds(&self, name: &str) -> SdkResult<(i64, i64)> {
        let mut bus = lock(&self.bus);
        bus.record(SdkCall::NodeRead)?;
        bus.camera(self.camera)?.bounds(name)
    }

    fn set_integer(&mut self, name: &str, value: i64) -> SdkResult<()> {
        let mut bus = lock(&self.bus);
        bus.record(SdkCall::NodeWrite)?;
        bus.camera(self.camera)?.set_integer(name, value)
    }

    fn enum_entry_access(&self, name: &str, entry: &str) -> SdkResult<NodeAccess> {
        let mut bus = lock(&self.bus);
        bus.record(SdkCall::NodeRead)?;
        let camera = bus.camera(self.camera)?;
        if name != features::PIXEL_FORMAT {
            return Err(SdkError::InvalidArgument(format!(
                "{name} is not an enumeration node"
            )));
        }
        let format: PixelFormat = entry
            .parse()
            .map_err(|_| SdkError::NotFound(format!("{name}::{entry}")))?;
        Ok(if camera.spec.supported_formats.contains(&format) {
            NodeAccess::READ_ONLY
        } else {
            NodeAccess::UNAVAILABLE
        })
    }

    fn enum_entry_value(&self, name: &str, entry: &str) -> SdkResult<i64> {
        lock(&self.bus).record(SdkCall::NodeRead)?;
        if name != features::PIXEL_FORMAT {
            return Err(SdkError::InvalidArgument(format!(
                "{name} is not an enumeration node"
            )));
        }
        entry
            .parse()
            .map(pfnc_code)
            .map_err(|_| SdkError::NotFound(format!("{name}::{entry}")))
    }

    fn set_enum(&mut self, name: &str, value: i64) -> SdkResult<()> {
        let mut bus = lock(&self.bus);
        bus.record(SdkCall::NodeWrite)?;
        let camera = bus.camera(self.camera)?;
        if !camera.access(name)?.is_available_and_writable() {
            return Err(SdkError::AccessDenied(name.to_string()));
        }
        let format = PixelFormat::ALL
            .into_iter()
            .find(|f| pfnc_code(*f) == value)
            .ok_or_else(|| SdkError::InvalidArgument(format!("{name}={value:#x}")))?;
        camera.settings.pixel_format = format;
        Ok(())
    }
}

/// Image handed out by a simulated camera.
#[derive(Debug)]
pub struct SimulatedImage {
    bus: Arc<Mutex<Bus>>,
    data: Vec<u8>,
    width: usize,
    height: usize,
    stride: usize,
    format: PixelFormat,
    incomplete: bool,
    alignment: usize,
}

impl RawImage for SimulatedImage {
    fn is_incomplete(&self) -> SdkResult<bool> {
        lock(&self.bus).record(SdkCall::ImageIncomplete)?;
        Ok(self.incomplete)
    }

    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn stride(&self) -> usize {
        self.stride
    }

    fn pixel_format(&self) -> PixelFormat {
        self.format
    }

    fn data(&self) -> &[u8] {
        &self.data
    }

    fn convert_mono8(&self) -> SdkResult<ConvertedImage> {
        lock(&self.bus).record(SdkCall::ConvertImage)?;
        let stride = self.width.div_ceil(self.alignment) * self.alignment;
        let shift = self.format.bit_depth() - 8;
        let mut data = vec![0u8; stride * self.height];
        for (src, dst) in self
            .data
            .chunks(self.stride.max(1))
            .zip(data.chunks_mut(stride.max(1)))
        {
            match self.format.bytes_per_pixel() {
                1 => dst[..self.width].copy_from_slice(&src[..self.width]),
                _ => {
                    for (out, sample) in dst.iter_mut().zip(src.chunks_exact(2)) {
                        *out = (u16::from_le_bytes([sample[0], sample[1]]) >> shift) as u8;
                    }
                }
            }
        }
        Ok(ConvertedImage {
            data,
            width: self.width,
            height: self.height,
            stride,
        })
    }

    fn release(self) -> SdkResult<()> {
        let mut bus = lock(&self.bus);
        bus.record(SdkCall::ReleaseImage)?;
        bus.outstanding.images -= 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(sdk: &mut SimulatedSdk) -> (SimulatedSystem, SimulatedCameraList, SimulatedCameraHandle) {
        let mut system = sdk.acquire_system().unwrap();
        let list = system.cameras().unwrap();
        let mut camera = list.get(0).unwrap();
        camera.init().unwrap();
        (system, list, camera)
    }

    #[test]
    fn test_handles_tracked_until_released() {
        let mut sdk = SimulatedSdk::default();
        let (system, mut list, mut camera) = open(&mut sdk);
        assert_eq!(
            sdk.outstanding(),
            Outstanding {
                systems: 1,
                lists: 1,
                cameras: 1,
                images: 0
            }
        );
        assert!(sdk.is_claimed(0));

        camera.deinit().unwrap();
        camera.release().unwrap();
        list.clear().unwrap();
        assert_eq!(list.len().unwrap(), 0);
        list.destroy().unwrap();
        system.release().unwrap();
        assert!(sdk.outstanding().is_clean());
        assert!(!sdk.is_claimed(0));
    }

    #[test]
    fn test_small_sensor_accepts_its_own_size() {
        let mut sdk = SimulatedSdk::new(vec![SimulatedCamera::with_sensor(100, 10)]);
        let (_system, _list, mut camera) = open(&mut sdk);
        let nodes = camera.node_map().unwrap();
        assert_eq!(nodes.integer_bounds(features::HEIGHT).unwrap(), (1, 10));
        nodes.set_integer(features::HEIGHT, 7).unwrap();
        nodes.set_integer(features::WIDTH, 33).unwrap();
        let settings = sdk.camera_settings(0).unwrap();
        assert_eq!((settings.width, settings.height), (33, 7));
    }

    #[test]
    fn test_second_init_reports_busy() {
        let mut sdk = SimulatedSdk::default();
        let (_system, list, _camera) = open(&mut sdk);
        let mut other = list.get(0).unwrap();
        assert!(matches!(other.init(), Err(SdkError::Busy(_))));
    }

    #[test]
    fn test_nodes_lock_while_streaming() {
        let mut sdk = SimulatedSdk::default();
        let (_system, _list, mut camera) = open(&mut sdk);
        assert!(camera
            .node_map()
            .unwrap()
            .access(features::WIDTH)
            .unwrap()
            .writable);

        camera.begin_acquisition().unwrap();
        let nodes = camera.node_map().unwrap();
        assert!(!nodes.access(features::WIDTH).unwrap().writable);
        assert!(matches!(
            nodes.set_integer(features::WIDTH, 320),
            Err(SdkError::AccessDenied(_))
        ));
    }

    #[test]
    fn test_mono14_conversion_scales_to_eight_bits() {
        let mut sdk = SimulatedSdk::new(vec![SimulatedCamera {
            stride_alignment: 64,
            ..SimulatedCamera::with_sensor(100, 4)
        }]);
        let (_system, _list, mut camera) = open(&mut sdk);
        let nodes = camera.node_map().unwrap();
        nodes
            .set_enum(features::PIXEL_FORMAT, pfnc_code(PixelFormat::Mono14))
            .unwrap();
        camera.begin_acquisition().unwrap();

        let image = camera.next_image().unwrap();
        assert_eq!(image.pixel_format(), PixelFormat::Mono14);
        assert_eq!(image.stride(), 200);
        assert!(image
            .data()
            .chunks_exact(2)
            .all(|s| u16::from_le_bytes([s[0], s[1]]) < (1 << 14)));

        let converted = image.convert_mono8().unwrap();
        assert_eq!(converted.stride, 128);
        assert_eq!(converted.data.len(), 128 * 4);
        let first = u16::from_le_bytes([image.data()[0], image.data()[1]]);
        assert_eq!(converted.data[0], (first >> 6) as u8);
        assert!(converted.data[100..128].iter().all(|&b| b == 0));
        image.release().unwrap();
    }

    #[test]
    fn test_injected_faults() {
        let mut sdk = SimulatedSdk::default();
        let (_system, _list, mut camera) = open(&mut sdk);
        camera.begin_acquisition().unwrap();

        sdk.timeout_next(1);
        sdk.incomplete_next(1);
        sdk.fail_next(SdkCall::ConvertImage, 1);

        assert!(matches!(camera.next_image(), Err(SdkError::Timeout)));
        let image = camera.next_image().unwrap();
        assert!(image.is_incomplete().unwrap());
        assert!(matches!(
            image.convert_mono8(),
            Err(SdkError::Failure { .. })
        ));
        assert!(image.convert_mono8().is_ok());
        image.release().unwrap();
        assert_eq!(sdk.call_count(SdkCall::NextImage), 2);
        assert_eq!(sdk.outstanding().images, 0);
    }

    #[test]
    fn test_same_seed_same_frames() {
        let grab = |seed| {
            let mut sdk = SimulatedSdk::with_seed(vec![SimulatedCamera::with_sensor(32, 8)], seed);
            let (_system, _list, mut camera) = open(&mut sdk);
            camera.begin_acquisition().unwrap();
            let image = camera.next_image().unwrap();
            let data = image.data().to_vec();
            image.release().unwrap();
            data
        };
        assert_eq!(grab(7), grab(7));
        assert_ne!(grab(7), grab(8));
    }
}
