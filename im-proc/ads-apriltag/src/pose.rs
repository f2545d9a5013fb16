/// Camera and tag parameters required for pose estimation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseParams {
    /// Physical edge length of the tag's black border, in meters.
    pub tag_size: f64,
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

/// Tag pose in the camera frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    /// Rotation matrix, row-major.
    pub rotation: [[f64; 3]; 3],
    /// Translation, in the units of [PoseParams::tag_size].
    pub translation: [f64; 3],
    /// Object-space error reported by the estimator.
    pub error: f64,
}

/// Copy a matrix owned by the C library into a fixed size array and free it.
///
/// Returns NaN entries if the library returned a null or wrongly sized matrix.
unsafe fn take_matd<const R: usize, const C: usize>(m: *mut apriltag_sys::matd_t) -> [[f64; C]; R] {
    let mut out = [[f64::NAN; C]; R];
    if m.is_null() {
        return out;
    }
    unsafe {
        let nrows = (*m).nrows as usize;
        let ncols = (*m).ncols as usize;
        if nrows == R && ncols == C && !(*m).data.is_null() {
            let data = std::slice::from_raw_parts((*m).data, R * C);
            for (i, row) in out.iter_mut().enumerate() {
                row.copy_from_slice(&data[i * C..(i + 1) * C]);
            }
        }
        apriltag_sys::matd_destroy(m);
    }
    out
}

pub(crate) fn estimate(det: *mut apriltag_sys::apriltag_detection_t, params: &PoseParams) -> Pose {
    let mut info = apriltag_sys::apriltag_detection_info_t {
        det,
        tagsize: params.tag_size,
        fx: params.fx,
        fy: params.fy,
        cx: params.cx,
        cy: params.cy,
    };
    let mut raw = apriltag_sys::apriltag_pose_t {
        R: std::ptr::null_mut(),
        t: std::ptr::null_mut(),
    };
    let error = unsafe { apriltag_sys::estimate_tag_pose(&mut info, &mut raw) };
    let rotation = unsafe { take_matd::<3, 3>(raw.R) };
    let translation = unsafe { take_matd::<3, 1>(raw.t) };
    Pose {
        rotation,
        translation: [translation[0][0], translation[1][0], translation[2][0]],
        error,
    }
}
