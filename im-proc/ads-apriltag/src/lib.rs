use std::{convert::TryInto, os::raw::c_char};

mod pose;
pub use pose::{Pose, PoseParams};

/// Associates array pointer destroy function to a Zarray.
pub trait ArrayDealloc {
    // Call `apriltag_x_destroy()` for the correct array type.
    fn array_dealloc(zarray_ptr: *mut apriltag_sys::zarray);
}

/// An array of a single type, owned by the C library.
#[repr(transparent)]
pub struct Zarray<T: ArrayDealloc> {
    inner: *mut apriltag_sys::zarray_t,
    marker: std::marker::PhantomData<T>,
}

impl<T: ArrayDealloc> Zarray<T> {
    unsafe fn from_raw(inner: *mut apriltag_sys::zarray_t) -> Zarray<T> {
        assert!(!inner.is_null());
        assert!(unsafe { (*inner).el_sz } == std::mem::size_of::<T>().try_into().unwrap());

        Self {
            inner,
            marker: std::marker::PhantomData,
        }
    }

    /// Return the length of the array.
    pub fn len(&self) -> usize {
        unsafe {
            let ptr = *self.inner;
            ptr.size.try_into().unwrap()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return a slice viewing the array.
    pub fn as_slice(&self) -> &[T] {
        if self.is_empty() {
            return &[];
        }
        unsafe {
            let ptr = *self.inner;
            std::slice::from_raw_parts(ptr.data as *mut T, self.len())
        }
    }
}

impl<T: ArrayDealloc> Drop for Zarray<T> {
    fn drop(&mut self) {
        if !self.inner.is_null() {
            T::array_dealloc(self.inner);
            self.inner = std::ptr::null_mut();
        }
    }
}

/// A grayscale image borrowed from a caller-owned buffer.
pub struct ImageU8Borrowed<'a> {
    inner: apriltag_sys::image_u8,
    data_lifetime: std::marker::PhantomData<&'a [u8]>,
}

impl<'a> ImageU8Borrowed<'a> {
    /// View `data` as an image. Returns `None` if the buffer is too small for
    /// the given dimensions.
    pub fn new(width: i32, height: i32, stride: i32, data: &'a [u8]) -> Option<Self> {
        if width <= 0 || height <= 0 || stride < width {
            return None;
        }
        let min_size = (height as usize - 1) * stride as usize + width as usize;
        if data.len() >= min_size {
            let inner = apriltag_sys::image_u8 {
                width,
                height,
                stride,
                buf: data.as_ptr() as *mut u8,
            };

            Some(Self {
                inner,
                data_lifetime: std::marker::PhantomData,
            })
        } else {
            None
        }
    }

    pub fn inner(&self) -> &apriltag_sys::image_u8 {
        &self.inner
    }
}

/// Tuning parameters of the detector.
///
/// The defaults are the values used for offline tracking of recorded video.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorParams {
    pub quad_decimate: f32,
    pub quad_sigma: f32,
    pub refine_edges: bool,
    pub decode_sharpening: f64,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            quad_decimate: 2.0,
            quad_sigma: 0.0,
            refine_edges: true,
            decode_sharpening: 0.25,
        }
    }
}

/// The main type for detecting tags
#[derive(Debug)]
pub struct Detector {
    td: *mut apriltag_sys::apriltag_detector,
    families: Vec<Family>,
}

unsafe impl Send for Detector {}

impl Default for Detector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector {
    /// Constructor
    pub fn new() -> Self {
        let td: *mut apriltag_sys::apriltag_detector =
            unsafe { apriltag_sys::apriltag_detector_create() };
        Self {
            td,
            families: vec![],
        }
    }

    /// Apply tuning parameters.
    pub fn set_params(&mut self, params: &DetectorParams) {
        let raw_td = self.as_mut();
        raw_td.quad_decimate = params.quad_decimate;
        raw_td.quad_sigma = params.quad_sigma;
        raw_td.refine_edges = params.refine_edges;
        raw_td.decode_sharpening = params.decode_sharpening;
    }

    /// Add a tag family
    ///
    /// We take ownership of the family to keep its lifetime.
    pub fn add_family(&mut self, family: Family) {
        self.add_family_bits(family, 2)
    }

    /// Add a tag family, correcting up to `bits` bit errors.
    pub fn add_family_bits(&mut self, family: Family, bits: i32) {
        unsafe { apriltag_sys::apriltag_detector_add_family_bits(self.td, family.0, bits) };
        self.families.push(family)
    }

    pub fn num_families(&self) -> usize {
        self.families.len()
    }

    /// Detect tags in an image
    pub fn detect(&self, im: &apriltag_sys::image_u8) -> Zarray<Detection> {
        let detections: *mut apriltag_sys::zarray_t = unsafe {
            let ptr = im as *const apriltag_sys::image_u8;
            apriltag_sys::apriltag_detector_detect(self.td, ptr as *mut _)
        };
        unsafe { Zarray::from_raw(detections) }
    }
}

impl Drop for Detector {
    fn drop(&mut self) {
        if !self.td.is_null() {
            unsafe { apriltag_sys::apriltag_detector_destroy(self.td) };
            self.td = std::ptr::null_mut();
        }
    }
}

impl std::convert::AsMut<apriltag_sys::apriltag_detector> for Detector {
    fn as_mut(&mut self) -> &mut apriltag_sys::apriltag_detector {
        unsafe { &mut *self.td }
    }
}

#[repr(transparent)]
#[derive(Debug)]
pub struct Family(*mut apriltag_sys::apriltag_family_t);

unsafe impl Send for Family {}

impl Family {
    /// Create a new detector family for the given type.
    pub fn new(family_type: FamilyType) -> Self {
        use FamilyType::*;
        let tf: *mut apriltag_sys::apriltag_family_t = unsafe {
            match family_type {
                Family16H5 => apriltag_sys::tag16h5_create(),
                Family25H9 => apriltag_sys::tag25h9_create(),
                Family36H11 => apriltag_sys::tag36h11_create(),
                FamilyCircle21h7 => apriltag_sys::tagCircle21h7_create(),
                FamilyCircle49H12 => apriltag_sys::tagCircle49h12_create(),
                FamilyCustom48h12 => apriltag_sys::tagCustom48h12_create(),
                Family41H12 => apriltag_sys::tagStandard41h12_create(),
                Family52H13 => apriltag_sys::tagStandard52h13_create(),
            }
        };
        Self(tf)
    }

    pub fn family_type(&self) -> FamilyType {
        let name = unsafe { (*self.0).name };
        FamilyType::from_name(name)
    }
}

impl Drop for Family {
    fn drop(&mut self) {
        if !self.0.is_null() {
            use FamilyType::*;
            match self.family_type() {
                Family16H5 => unsafe { apriltag_sys::tag16h5_destroy(self.0) },
                Family25H9 => unsafe { apriltag_sys::tag25h9_destroy(self.0) },
                Family36H11 => unsafe { apriltag_sys::tag36h11_destroy(self.0) },
                FamilyCircle21h7 => unsafe { apriltag_sys::tagCircle21h7_destroy(self.0) },
                FamilyCircle49H12 => unsafe { apriltag_sys::tagCircle49h12_destroy(self.0) },
                FamilyCustom48h12 => unsafe { apriltag_sys::tagCustom48h12_destroy(self.0) },
                Family41H12 => unsafe { apriltag_sys::tagStandard41h12_destroy(self.0) },
                Family52H13 => unsafe { apriltag_sys::tagStandard52h13_destroy(self.0) },
            }
            self.0 = std::ptr::null_mut();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FamilyType {
    Family16H5,
    Family25H9,
    Family36H11,
    FamilyCircle21h7,
    FamilyCircle49H12,
    FamilyCustom48h12,
    Family41H12,
    Family52H13,
}

impl FamilyType {
    pub const ALL: [FamilyType; 8] = [
        FamilyType::Family16H5,
        FamilyType::Family25H9,
        FamilyType::Family36H11,
        FamilyType::FamilyCircle21h7,
        FamilyType::FamilyCircle49H12,
        FamilyType::FamilyCustom48h12,
        FamilyType::Family41H12,
        FamilyType::Family52H13,
    ];

    fn from_name(name: *mut c_char) -> Self {
        let slice = unsafe { std::ffi::CStr::from_ptr(name) };
        match Self::from_str_name(&slice.to_string_lossy()) {
            Some(ft) => ft,
            None => panic!("unknown tag family: {:?}", slice),
        }
    }

    /// Parse the C library's family name, e.g. `tag36h11`.
    pub fn from_str_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|ft| ft.to_str() == name)
    }

    pub fn to_str(&self) -> &'static str {
        use FamilyType::*;
        match self {
            Family16H5 => "tag16h5",
            Family25H9 => "tag25h9",
            Family36H11 => "tag36h11",
            FamilyCircle21h7 => "tagCircle21h7",
            FamilyCircle49H12 => "tagCircle49h12",
            FamilyCustom48h12 => "tagCustom48h12",
            Family41H12 => "tagStandard41h12",
            Family52H13 => "tagStandard52h13",
        }
    }
}

impl std::fmt::Display for FamilyType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.to_str())
    }
}

#[repr(transparent)]
pub struct Detection(*mut apriltag_sys::apriltag_detection_t);

impl Detection {
    pub fn id(&self) -> i32 {
        unsafe { (*self.0).id }
    }
    pub fn hamming(&self) -> i32 {
        unsafe { (*self.0).hamming }
    }
    pub fn decision_margin(&self) -> f32 {
        unsafe { (*self.0).decision_margin }
    }
    pub fn center(&self) -> &[f64; 2] {
        unsafe { &(*self.0).c }
    }
    /// The corners of the tag in image pixel coordinates, counter-clockwise
    /// around the tag center.
    pub fn corners(&self) -> &[[f64; 2]; 4] {
        unsafe { &(*self.0).p }
    }
    /// Estimate the tag pose relative to the camera.
    pub fn estimate_pose(&self, params: &PoseParams) -> Pose {
        pose::estimate(self.0, params)
    }
}

impl std::fmt::Debug for Detection {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let d = unsafe { *self.0 };
        write!(
            f,
            "Detection{{id: {}, hamming: {}, decision_margin: {}, c: {:?}, p: {:?}}}",
            d.id, d.hamming, d.decision_margin, d.c, d.p
        )
    }
}

impl ArrayDealloc for Detection {
    fn array_dealloc(zarray_ptr: *mut apriltag_sys::zarray) {
        unsafe { apriltag_sys::apriltag_detections_destroy(zarray_ptr) };
    }
}

#[cfg(test)]
mod test {
    use crate::*;

    #[test]
    fn family_types() {
        for ft in FamilyType::ALL {
            let f = Family::new(ft);
            assert_eq!(f.family_type(), ft);
            assert_eq!(FamilyType::from_str_name(ft.to_str()), Some(ft));
        }
        assert_eq!(Family::new(FamilyType::Family36H11).family_type().to_str(), "tag36h11");
        assert_eq!(FamilyType::from_str_name("tag99h99"), None);
    }

    #[test]
    fn image_too_small() {
        let buf = vec![0u8; 10];
        assert!(ImageU8Borrowed::new(4, 4, 4, &buf).is_none());
        assert!(ImageU8Borrowed::new(0, 4, 4, &buf).is_none());
        assert!(ImageU8Borrowed::new(2, 2, 4, &buf).is_some());
    }
}
