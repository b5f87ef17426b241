//! Clipped raster primitives shared by the frame overlay and chart renderer.

use std::ops::DerefMut;

use image::{ImageBuffer, Rgb};

pub(crate) fn put_pixel<C>(image: &mut ImageBuffer<Rgb<u8>, C>, x: i32, y: i32, color: Rgb<u8>)
where
    C: DerefMut<Target = [u8]>,
{
    if x >= 0 && y >= 0 && (x as u32) < image.width() && (y as u32) < image.height() {
        *image.get_pixel_mut(x as u32, y as u32) = color;
    }
}

pub(crate) fn fill_rect<C>(
    image: &mut ImageBuffer<Rgb<u8>, C>,
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
    color: Rgb<u8>,
) where
    C: DerefMut<Target = [u8]>,
{
    let width = image.width() as i32;
    let height = image.height() as i32;
    let left = left.clamp(0, width);
    let right = right.clamp(-1, width - 1);
    let top = top.clamp(0, height);
    let bottom = bottom.clamp(-1, height - 1);

    for y in top..=bottom {
        for x in left..=right {
            *image.get_pixel_mut(x as u32, y as u32) = color;
        }
    }
}

/// Filled disc of `radius` pixels centred on (`cx`, `cy`).
pub(crate) fn fill_circle<C>(
    image: &mut ImageBuffer<Rgb<u8>, C>,
    cx: i32,
    cy: i32,
    radius: i32,
    color: Rgb<u8>,
) where
    C: DerefMut<Target = [u8]>,
{
    let r2 = radius * radius;
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= r2 {
                put_pixel(image, cx + dx, cy + dy, color);
            }
        }
    }
}

/// Bresenham line; `thickness` > 1 stamps a square brush at each step.
pub(crate) fn draw_line<C>(
    image: &mut ImageBuffer<Rgb<u8>, C>,
    (x0, y0): (i32, i32),
    (x1, y1): (i32, i32),
    color: Rgb<u8>,
    thickness: i32,
) where
    C: DerefMut<Target = [u8]>,
{
    let half = (thickness.max(1) - 1) / 2;
    let extra = (thickness.max(1) - 1) - half;
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    let (mut x, mut y) = (x0, y0);

    loop {
        for oy in -half..=extra {
            for ox in -half..=extra {
                put_pixel(image, x + ox, y + oy, color);
            }
        }
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}
