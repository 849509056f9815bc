//! Display output backends.
//!
//! The compositor composes into an owned back buffer and presents clipped
//! regions to a front surface. Three fronts exist: the framebuffer device
//! (the normal case), a window of a parent compositor (nested mode), and a
//! plain memory surface (headless operation and the integration tests).

use std::fs::OpenOptions;
use std::io;
use std::os::fd::AsRawFd;
use std::sync::Arc;

use log::{debug, info};
use spin::Mutex;

use mullion_abi::damage::DamageRect;
use mullion_abi::message::Message;
use mullion_abi::window::Wid;
use mullion_gfx::DrawBuffer;
use mullion_ipc::{Client, SharedBuffer};

use crate::ServerError;

pub enum Output {
    Memory(MemoryOutput),
    Fbdev(FbdevOutput),
    Nested(NestedOutput),
}

impl Output {
    pub fn width(&self) -> u32 {
        match self {
            Output::Memory(o) => o.width,
            Output::Fbdev(o) => o.width,
            Output::Nested(o) => o.width,
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            Output::Memory(o) => o.height,
            Output::Fbdev(o) => o.height,
            Output::Nested(o) => o.height,
        }
    }

    /// Copy the given back-buffer regions to the display.
    pub fn present(&mut self, back: &DrawBuffer, regions: &[DamageRect]) {
        match self {
            Output::Memory(o) => o.present(back, regions),
            Output::Fbdev(o) => o.present(back, regions),
            Output::Nested(o) => o.present(back, regions),
        }
    }
}

/// A memory front surface, shared so tests (or a future scanout shim) can
/// observe what the user would see.
pub struct MemoryOutput {
    pub width: u32,
    pub height: u32,
    front: Arc<Mutex<Vec<u32>>>,
}

impl MemoryOutput {
    pub fn new(width: u32, height: u32) -> (Self, Arc<Mutex<Vec<u32>>>) {
        let front = Arc::new(Mutex::new(vec![0u32; (width * height) as usize]));
        (
            Self {
                width,
                height,
                front: Arc::clone(&front),
            },
            front,
        )
    }

    fn present(&mut self, back: &DrawBuffer, regions: &[DamageRect]) {
        let mut front = self.front.lock();
        copy_regions(back, &mut front, self.width as i32, regions);
    }
}

fn copy_regions(back: &DrawBuffer, front: &mut [u32], pitch: i32, regions: &[DamageRect]) {
    let src = back.pixels();
    for region in regions {
        let r = region.clip(back.width(), back.height());
        if !r.is_valid() {
            continue;
        }
        for y in r.y0..=r.y1 {
            let src_off = (y * back.width() + r.x0) as usize;
            let dst_off = (y * pitch + r.x0) as usize;
            let len = r.width() as usize;
            front[dst_off..dst_off + len].copy_from_slice(&src[src_off..src_off + len]);
        }
    }
}

/// The raw framebuffer device, mapped read-write.
pub struct FbdevOutput {
    pub width: u32,
    pub height: u32,
    pitch: u32,
    map: *mut u32,
    map_len: usize,
}

// The mapping belongs solely to the render thread.
unsafe impl Send for FbdevOutput {}

// What the variable-screen-info ioctl fills in; only the leading fields
// matter here, the rest pads out to the kernel's 160-byte struct.
#[repr(C)]
#[derive(Default)]
struct FbVarScreeninfo {
    xres: u32,
    yres: u32,
    xres_virtual: u32,
    yres_virtual: u32,
    xoffset: u32,
    yoffset: u32,
    bits_per_pixel: u32,
    grayscale: u32,
    reserved: [u32; 32],
}

const FBIOGET_VSCREENINFO: libc::c_ulong = 0x4600;

impl FbdevOutput {
    /// Open and map the framebuffer device (`FRAMEBUFFER` overrides the
    /// default path).
    pub fn open() -> Result<Self, ServerError> {
        let path = std::env::var("FRAMEBUFFER").unwrap_or_else(|_| "/dev/fb0".into());
        let file = OpenOptions::new().read(true).write(true).open(&path)?;

        let mut info = FbVarScreeninfo::default();
        let rc = unsafe { libc::ioctl(file.as_raw_fd(), FBIOGET_VSCREENINFO, &mut info) };
        if rc != 0 {
            return Err(ServerError::Io(io::Error::last_os_error()));
        }
        if info.bits_per_pixel != 32 {
            return Err(ServerError::Display(format!(
                "{}: unsupported depth {} bpp",
                path, info.bits_per_pixel
            )));
        }

        let pitch = info.xres_virtual.max(info.xres);
        let map_len = (pitch * info.yres) as usize * 4;
        let map = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                map_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                0,
            )
        };
        if map == libc::MAP_FAILED {
            return Err(ServerError::Io(io::Error::last_os_error()));
        }

        info!("framebuffer {}: {}x{}", path, info.xres, info.yres);
        Ok(Self {
            width: info.xres,
            height: info.yres,
            pitch,
            map: map as *mut u32,
            map_len,
        })
    }

    fn present(&mut self, back: &DrawBuffer, regions: &[DamageRect]) {
        let front =
            unsafe { std::slice::from_raw_parts_mut(self.map, self.map_len / 4) };
        copy_regions(back, front, self.pitch as i32, regions);
    }
}

impl Drop for FbdevOutput {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.map as *mut libc::c_void, self.map_len);
        }
    }
}

/// A window of a parent compositor instance, used in nested mode. Presents
/// copy into the parent-shared buffer and flip the touched regions.
pub struct NestedOutput {
    pub width: u32,
    pub height: u32,
    wid: Wid,
    buffer: SharedBuffer,
    writer: Client,
}

impl NestedOutput {
    pub fn new(width: u32, height: u32, wid: Wid, buffer: SharedBuffer, writer: Client) -> Self {
        Self {
            width,
            height,
            wid,
            buffer,
            writer,
        }
    }

    fn present(&mut self, back: &DrawBuffer, regions: &[DamageRect]) {
        let pitch = self.width as i32;
        copy_regions(back, self.buffer.pixels_mut(), pitch, regions);
        for region in regions {
            let r = region.clip(back.width(), back.height());
            if !r.is_valid() {
                continue;
            }
            let flip = Message::FlipRegion {
                wid: self.wid,
                x: r.x0,
                y: r.y0,
                width: r.width(),
                height: r.height(),
            };
            if let Err(e) = self.writer.send(&flip.encode()) {
                debug!("nested flip failed: {}", e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_present_copies_only_the_regions() {
        let (mut out, front) = MemoryOutput::new(8, 8);
        let mut back = DrawBuffer::new(8, 8);
        let bounds = back.bounds();
        back.fill_rect(&bounds, &bounds, 0xFFFF_FFFF);

        out.present(&back, &[DamageRect::from_xywh(1, 1, 2, 2)]);
        let front = front.lock();
        assert_eq!(front[1 * 8 + 1], 0xFFFF_FFFF);
        assert_eq!(front[2 * 8 + 2], 0xFFFF_FFFF);
        assert_eq!(front[0], 0);
        assert_eq!(front[3 * 8 + 3], 0);
    }

    #[test]
    fn out_of_range_regions_are_clipped() {
        let (mut out, front) = MemoryOutput::new(4, 4);
        let mut back = DrawBuffer::new(4, 4);
        let bounds = back.bounds();
        back.fill_rect(&bounds, &bounds, 0xFF00_00FF);
        out.present(&back, &[DamageRect::from_xywh(-10, -10, 100, 100)]);
        assert!(front.lock().iter().all(|&p| p == 0xFF00_00FF));
    }
}
