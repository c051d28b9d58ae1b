use macroquad::camera::Camera2D;
use macroquad::math::{vec2, Rect, Vec2};

/// World-space corners seen through `cam`.
pub fn camera_view(cam: &Camera2D) -> (Vec2, Vec2) {
    let half = vec2(1.0 / cam.zoom.x.abs(), 1.0 / cam.zoom.y.abs());
    (cam.target - half, cam.target + half)
}

/// Rectangle spanned by two view corners given in any order, padded on every side.
pub fn view_rect(view_min: Vec2, view_max: Vec2, pad: Vec2) -> Rect {
    let mut min_x = view_min.x;
    let mut min_y = view_min.y;
    let mut max_x = view_max.x;
    let mut max_y = view_max.y;

    if min_x > max_x {
        std::mem::swap(&mut min_x, &mut max_x);
    }
    if min_y > max_y {
        std::mem::swap(&mut min_y, &mut max_y);
    }

    Rect::new(
        min_x - pad.x,
        min_y - pad.y,
        (max_x - min_x) + 2.0 * pad.x,
        (max_y - min_y) + 2.0 * pad.y,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_rect_orders_corners_and_pads() {
        let r = view_rect(vec2(100.0, 80.0), vec2(0.0, 0.0), vec2(16.0, 8.0));
        assert_eq!(r, Rect::new(-16.0, -8.0, 132.0, 96.0));
    }

    #[test]
    fn camera_view_is_centered_on_target() {
        let cam = Camera2D {
            target: vec2(160.0, 120.0),
            zoom: vec2(2.0 / 320.0, -2.0 / 240.0),
            ..Default::default()
        };
        let (min, max) = camera_view(&cam);
        assert!((min.x - 0.0).abs() < 0.01 && (min.y - 0.0).abs() < 0.01);
        assert!((max.x - 320.0).abs() < 0.01 && (max.y - 240.0).abs() < 0.01);
    }
}
