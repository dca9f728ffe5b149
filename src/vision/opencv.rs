use opencv::{
    core::{self, Mat, Ptr, Scalar, Size, TermCriteria, Vec3f, Vector},
    imgcodecs, imgproc,
    prelude::*,
    video,
    videoio::{self, VideoCapture, VideoCaptureAPIs},
};

use super::{Camera, FrameSource, Marker, Optics, Point};
use crate::config::CameraConfig;
use crate::error::VisionError;

/// Trails longer than this are tracking jumps and not drawn.
const MAX_TRAIL_PX: f32 = 80.0;

/// V4L/USB camera opened through OpenCV.
pub struct OpenCvCamera {
    config: CameraConfig,
}

impl OpenCvCamera {
    pub fn new(config: CameraConfig) -> Self {
        Self { config }
    }
}

impl Camera for OpenCvCamera {
    type Source = OpenCvSource;

    fn open(&self) -> Result<OpenCvSource, VisionError> {
        let unavailable = |e: opencv::Error| VisionError::CameraUnavailable(e.to_string());
        let index = self.config.index;
        let mut capture =
            VideoCapture::new(index, VideoCaptureAPIs::CAP_ANY as i32).map_err(unavailable)?;
        if !capture.is_opened().map_err(unavailable)? {
            return Err(VisionError::CameraUnavailable(format!("camera {index} is not available")));
        }

        capture
            .set(videoio::CAP_PROP_FRAME_WIDTH, self.config.width as f64)
            .map_err(unavailable)?;
        capture
            .set(videoio::CAP_PROP_FRAME_HEIGHT, self.config.height as f64)
            .map_err(unavailable)?;
        // only the newest frame matters for tracking
        capture.set(videoio::CAP_PROP_BUFFERSIZE, 1.0).map_err(unavailable)?;

        let width = capture.get(videoio::CAP_PROP_FRAME_WIDTH).unwrap_or_default() as u32;
        let height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT).unwrap_or_default() as u32;
        tracing::info!(index, width, height, "camera opened");

        Ok(OpenCvSource { capture })
    }
}

/// Open capture handle. The device is released on drop.
pub struct OpenCvSource {
    capture: VideoCapture,
}

impl FrameSource for OpenCvSource {
    type Frame = Mat;

    fn read(&mut self) -> Result<Mat, VisionError> {
        let mut frame = Mat::default();
        let ok = self
            .capture
            .read(&mut frame)
            .map_err(|e| VisionError::Capture(e.to_string()))?;
        if !ok || frame.empty() {
            return Err(VisionError::Capture("empty frame received".to_string()));
        }
        Ok(frame)
    }
}

impl Drop for OpenCvSource {
    fn drop(&mut self) {
        if let Err(e) = self.capture.release() {
            tracing::warn!("camera release failed: {e}");
        }
    }
}

/// Filter chain, Hough circle detection and pyramidal Lucas-Kanade flow.
///
/// Points leave this type in Cartesian form (`y` up, origin bottom-left).
pub struct OpenCvOptics {
    mirror: bool,
    rotate: Option<i32>,
    kernel: Mat,
    clahe: Ptr<imgproc::CLAHE>,
}

impl OpenCvOptics {
    pub fn new(config: &CameraConfig) -> Result<Self, VisionError> {
        let rotate = match config.rotate.as_deref() {
            None | Some("") | Some("none") => None,
            Some("cw90") => Some(core::ROTATE_90_CLOCKWISE),
            Some("ccw90") => Some(core::ROTATE_90_COUNTERCLOCKWISE),
            Some("180") => Some(core::ROTATE_180),
            Some(other) => {
                return Err(VisionError::CameraUnavailable(format!("unknown rotation {other:?}")))
            }
        };
        let kernel = imgproc::get_structuring_element_def(imgproc::MORPH_ELLIPSE, Size::new(5, 5))?;
        let clahe = imgproc::create_clahe(3.0, Size::new(8, 8))?;
        Ok(Self {
            mirror: config.mirror,
            rotate,
            kernel,
            clahe,
        })
    }

    /// Mirror and rotate into the caster's view.
    fn orient(&self, raw: &Mat) -> Result<Mat, VisionError> {
        let mut frame = raw.try_clone()?;
        if self.mirror {
            let mut flipped = Mat::default();
            core::flip(&frame, &mut flipped, 1)?;
            frame = flipped;
        }
        if let Some(code) = self.rotate {
            let mut rotated = Mat::default();
            core::rotate(&frame, &mut rotated, code)?;
            frame = rotated;
        }
        Ok(frame)
    }
}

fn to_cartesian(x: f32, y: f32, height: i32) -> Point {
    Point::new(x, height as f32 - y)
}

fn to_image(p: Point, height: i32) -> core::Point2f {
    core::Point2f::new(p.x, height as f32 - p.y)
}

fn to_pixel(p: Point, height: i32) -> core::Point {
    let q = to_image(p, height);
    core::Point::new(q.x.round() as i32, q.y.round() as i32)
}

impl Optics<Mat> for OpenCvOptics {
    fn prepare(&mut self, raw: &Mat) -> Result<Mat, VisionError> {
        let oriented = self.orient(raw)?;

        let mut gray = Mat::default();
        imgproc::cvt_color_def(&oriented, &mut gray, imgproc::COLOR_BGR2GRAY)?;
        let mut equalized = Mat::default();
        imgproc::equalize_hist(&gray, &mut equalized)?;
        let mut blurred = Mat::default();
        imgproc::gaussian_blur_def(&equalized, &mut blurred, Size::new(9, 9), 1.5)?;
        let mut dilated = Mat::default();
        imgproc::dilate_def(&blurred, &mut dilated, &self.kernel)?;
        let mut out = Mat::default();
        self.clahe.apply(&dilated, &mut out)?;
        Ok(out)
    }

    fn find_circles(&mut self, prepared: &Mat) -> Result<Vec<Point>, VisionError> {
        let mut circles: Vector<Vec3f> = Vector::new();
        imgproc::hough_circles(
            prepared,
            &mut circles,
            imgproc::HOUGH_GRADIENT,
            3.0,
            50.0,
            240.0,
            8.0,
            4,
            15,
        )?;
        let height = prepared.rows();
        Ok(circles.iter().map(|c| to_cartesian(c[0], c[1], height)).collect())
    }

    fn track_points(
        &mut self,
        prev: &Mat,
        curr: &Mat,
        points: &[Point],
    ) -> Result<(Vec<Point>, Vec<bool>), VisionError> {
        let height = prev.rows();
        let prev_pts: Vector<core::Point2f> = points.iter().map(|&p| to_image(p, height)).collect();
        let mut next_pts: Vector<core::Point2f> = Vector::new();
        let mut status: Vector<u8> = Vector::new();
        let mut err: Vector<f32> = Vector::new();
        let criteria = TermCriteria::new(
            core::TermCriteria_Type::COUNT as i32 | core::TermCriteria_Type::EPS as i32,
            10,
            0.03,
        )?;
        video::calc_optical_flow_pyr_lk(
            prev,
            curr,
            &prev_pts,
            &mut next_pts,
            &mut status,
            &mut err,
            Size::new(15, 15),
            2,
            criteria,
            0,
            1e-4,
        )?;
        let tracked = next_pts.iter().map(|p| to_cartesian(p.x, p.y, height)).collect();
        let ok = status.iter().map(|s| s == 1).collect();
        Ok((tracked, ok))
    }

    fn annotate(&mut self, raw: &Mat, markers: &[Marker]) -> Result<Option<Vec<u8>>, VisionError> {
        let mut canvas = self.orient(raw)?;
        let height = canvas.rows();
        let green = Scalar::new(0.0, 255.0, 0.0, 0.0);
        let red = Scalar::new(0.0, 0.0, 255.0, 0.0);

        for marker in markers {
            let at = to_pixel(marker.at, height);
            imgproc::circle(&mut canvas, at, 5, green, 2, imgproc::LINE_8, 0)?;
            imgproc::put_text(
                &mut canvas,
                &marker.slot.to_string(),
                core::Point::new(at.x + 8, at.y - 8),
                imgproc::FONT_HERSHEY_SIMPLEX,
                0.5,
                green,
                1,
                imgproc::LINE_8,
                false,
            )?;
            if let Some(from) = marker.from.filter(|f| f.distance(marker.at) < MAX_TRAIL_PX) {
                imgproc::line(&mut canvas, to_pixel(from, height), at, red, 2, imgproc::LINE_8, 0)?;
            }
        }

        let mut buf: Vector<u8> = Vector::new();
        imgcodecs::imencode(".png", &canvas, &mut buf, &Vector::new())?;
        Ok(Some(buf.to_vec()))
    }
}
