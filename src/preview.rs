//! Blocking preview window for annotated images.

use anyhow::{anyhow, Result};
use image::RgbImage;
use sdl2::event::Event;
use sdl2::pixels::PixelFormatEnum;
use sdl2::rect::Rect as SdlRect;

/// Show `image` until a key is pressed or the window is closed.
pub fn show(title: &str, image: &RgbImage) -> Result<()> {
    let (width, height) = image.dimensions();
    let sdl = sdl2::init().map_err(|e| anyhow!("failed to initialize SDL2: {}", e))?;
    let video = sdl
        .video()
        .map_err(|e| anyhow!("failed to get SDL2 video subsystem: {}", e))?;
    let window = video
        .window(title, width, height)
        .position_centered()
        .resizable()
        .build()
        .map_err(|e| anyhow!("failed to build SDL2 window: {}", e))?;
    let mut canvas = window
        .into_canvas()
        .build()
        .map_err(|e| anyhow!("failed to build SDL2 canvas: {}", e))?;

    let creator = canvas.texture_creator();
    let mut texture = creator
        .create_texture_streaming(PixelFormatEnum::RGB24, width, height)
        .map_err(|e| anyhow!("failed to create texture: {}", e))?;
    texture
        .with_lock(None, |buffer: &mut [u8], pitch: usize| {
            let row_bytes = 3 * width as usize;
            for (y, row) in image.as_raw().chunks_exact(row_bytes).enumerate() {
                let start = y * pitch;
                buffer[start..start + row_bytes].copy_from_slice(row);
            }
        })
        .map_err(|e| anyhow!("failed to upload preview: {}", e))?;

    let mut events = sdl
        .event_pump()
        .map_err(|e| anyhow!("failed to get SDL2 event pump: {}", e))?;
    loop {
        for event in events.poll_iter() {
            if matches!(event, Event::Quit { .. } | Event::KeyDown { .. }) {
                return Ok(());
            }
        }
        canvas.clear();
        let (win_w, win_h) = canvas.window().size();
        canvas
            .copy(&texture, None, SdlRect::new(0, 0, win_w, win_h))
            .map_err(|e| anyhow!("failed to draw preview: {}", e))?;
        canvas.present();
        std::thread::sleep(std::time::Duration::from_millis(16));
    }
}
