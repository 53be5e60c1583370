//! GDI capture backend
//!
//! Windows are rendered with `PrintWindow(PW_CLIENTONLY | PW_RENDERFULLCONTENT)`,
//! which asks the window to paint itself into our memory DC. Unlike a blit
//! from the screen this yields the window's own content when it is covered or
//! in the background, including DirectComposition surfaces. The desktop is
//! copied from the screen DC with `BitBlt`.

use std::ffi::c_void;
use std::mem;

use tracing::{debug, trace};
use windows::Win32::Foundation::{BOOL, HWND, LPARAM, POINT, RECT};
use windows::Win32::Graphics::Gdi::{
    BitBlt, CreateCompatibleBitmap, CreateCompatibleDC, DeleteDC, DeleteObject, GetDC, GetDIBits,
    ReleaseDC, ScreenToClient, SelectObject, BITMAPINFO, BITMAPINFOHEADER, BI_RGB,
    DIB_RGB_COLORS, HBITMAP, HDC, HGDIOBJ, SRCCOPY,
};
use windows::Win32::Storage::Xps::{PrintWindow, PRINT_WINDOW_FLAGS, PW_CLIENTONLY};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumChildWindows, EnumWindows, GetClassNameW, GetClientRect, GetSystemMetrics, GetWindowRect,
    GetWindowTextW, IsWindow, IsWindowVisible, SM_CXSCREEN, SM_CYSCREEN,
};

use super::CaptureBackend;
use crate::error::{CaptureError, Result};
use crate::pixels::{ChannelOrder, PixelBuffer};
use crate::region::{Rect, Size};
use crate::window::{Surface, WindowId, WindowInfo};

/// Not exported by the metadata; renders DirectComposition content too
const PW_RENDERFULLCONTENT: PRINT_WINDOW_FLAGS = PRINT_WINDOW_FLAGS(2);

/// Capture backend built on GDI
#[derive(Debug, Default)]
pub struct GdiBackend;

impl GdiBackend {
    pub fn new() -> Self {
        Self
    }
}

fn to_hwnd(id: WindowId) -> HWND {
    HWND(id.0 as usize as *mut c_void)
}

fn to_id(hwnd: HWND) -> WindowId {
    WindowId(hwnd.0 as usize as u64)
}

fn live_hwnd(id: WindowId) -> Result<HWND> {
    let hwnd = to_hwnd(id);
    if unsafe { IsWindow(hwnd) }.as_bool() {
        Ok(hwnd)
    } else {
        Err(CaptureError::HandleInvalid)
    }
}

unsafe extern "system" fn collect_hwnd(hwnd: HWND, lparam: LPARAM) -> BOOL {
    let handles = &mut *(lparam.0 as *mut Vec<HWND>);
    handles.push(hwnd);
    true.into()
}

fn utf16_text(buffer: &[u16], len: i32) -> String {
    String::from_utf16_lossy(&buffer[..len.clamp(0, buffer.len() as i32) as usize])
}

fn window_info(hwnd: HWND, bounds: Rect) -> WindowInfo {
    let mut title = [0u16; 512];
    let mut class_name = [0u16; 256];
    let (title_len, class_len) = unsafe {
        (
            GetWindowTextW(hwnd, &mut title),
            GetClassNameW(hwnd, &mut class_name),
        )
    };

    WindowInfo {
        id: to_id(hwnd),
        title: utf16_text(&title, title_len),
        class_name: utf16_text(&class_name, class_len),
        bounds,
    }
}

fn rect_from(r: RECT) -> Rect {
    Rect::new(r.left, r.top, r.right - r.left, r.bottom - r.top)
}

/// Memory DC with a selected bitmap, released on drop
struct Canvas {
    screen: HDC,
    dc: HDC,
    bitmap: HBITMAP,
    previous: HGDIOBJ,
    width: i32,
    height: i32,
}

impl Canvas {
    unsafe fn new(width: i32, height: i32) -> Result<Self> {
        let screen = GetDC(HWND::default());
        if screen.is_invalid() {
            return Err(CaptureError::FrameAcquisition("GetDC failed".to_string()));
        }

        let dc = CreateCompatibleDC(screen);
        if dc.is_invalid() {
            ReleaseDC(HWND::default(), screen);
            return Err(CaptureError::FrameAcquisition(
                "CreateCompatibleDC failed".to_string(),
            ));
        }

        let bitmap = CreateCompatibleBitmap(screen, width, height);
        if bitmap.is_invalid() {
            let _ = DeleteDC(dc);
            ReleaseDC(HWND::default(), screen);
            return Err(CaptureError::FrameAcquisition(format!(
                "CreateCompatibleBitmap failed for {}x{}",
                width, height
            )));
        }

        let previous = SelectObject(dc, bitmap);

        Ok(Self {
            screen,
            dc,
            bitmap,
            previous,
            width,
            height,
        })
    }

    /// Read the whole bitmap as top-down BGRA with opaque alpha
    unsafe fn read_bgra(&mut self) -> Result<Vec<u8>> {
        // GetDIBits wants the bitmap deselected.
        SelectObject(self.dc, self.previous);

        let mut info = BITMAPINFO {
            bmiHeader: BITMAPINFOHEADER {
                biSize: mem::size_of::<BITMAPINFOHEADER>() as u32,
                biWidth: self.width,
                biHeight: -self.height,
                biPlanes: 1,
                biBitCount: 32,
                biCompression: BI_RGB.0,
                ..Default::default()
            },
            ..Default::default()
        };

        let mut bytes = vec![0u8; self.width as usize * self.height as usize * 4];
        let lines = GetDIBits(
            self.screen,
            self.bitmap,
            0,
            self.height as u32,
            Some(bytes.as_mut_ptr() as *mut c_void),
            &mut info,
            DIB_RGB_COLORS,
        );
        SelectObject(self.dc, self.bitmap);

        if lines != self.height {
            return Err(CaptureError::FrameAcquisition(format!(
                "GetDIBits copied {} of {} rows",
                lines, self.height
            )));
        }

        // GDI leaves the alpha byte undefined.
        for px in bytes.chunks_exact_mut(4) {
            px[3] = 255;
        }
        Ok(bytes)
    }
}

impl Drop for Canvas {
    fn drop(&mut self) {
        unsafe {
            SelectObject(self.dc, self.previous);
            let _ = DeleteObject(self.bitmap);
            let _ = DeleteDC(self.dc);
            ReleaseDC(HWND::default(), self.screen);
        }
    }
}

fn crop_bgra(full: &[u8], full_width: i32, rect: Rect) -> PixelBuffer {
    let stride = rect.width as usize * 4;
    let mut bytes = Vec::with_capacity(stride * rect.height as usize);
    for row in rect.y..rect.y + rect.height {
        let start = (row as usize * full_width as usize + rect.x as usize) * 4;
        bytes.extend_from_slice(&full[start..start + stride]);
    }
    PixelBuffer {
        width: rect.width as u32,
        height: rect.height as u32,
        stride,
        channel_order: ChannelOrder::Bgra,
        bytes,
    }
}

impl CaptureBackend for GdiBackend {
    fn name(&self) -> &'static str {
        "gdi"
    }

    fn enumerate(&self) -> Result<Vec<WindowInfo>> {
        let mut handles: Vec<HWND> = Vec::new();
        unsafe {
            EnumWindows(
                Some(collect_hwnd),
                LPARAM(&mut handles as *mut Vec<HWND> as isize),
            )
            .map_err(|e| CaptureError::Enumeration(e.to_string()))?;
        }

        let windows: Vec<WindowInfo> = handles
            .into_iter()
            .filter(|hwnd| unsafe { IsWindowVisible(*hwnd) }.as_bool())
            .filter_map(|hwnd| {
                let mut r = RECT::default();
                unsafe { GetWindowRect(hwnd, &mut r) }.ok()?;
                Some(window_info(hwnd, rect_from(r)))
            })
            .collect();

        debug!("enumerated {} visible top-level windows", windows.len());
        Ok(windows)
    }

    fn enumerate_children(&self, parent: WindowId) -> Result<Vec<WindowInfo>> {
        let parent = live_hwnd(parent)?;
        let mut handles: Vec<HWND> = Vec::new();
        unsafe {
            // Returns FALSE both for "no children" and for failure.
            let _ = EnumChildWindows(
                parent,
                Some(collect_hwnd),
                LPARAM(&mut handles as *mut Vec<HWND> as isize),
            );
        }

        Ok(handles
            .into_iter()
            .filter_map(|hwnd| {
                let mut r = RECT::default();
                unsafe { GetWindowRect(hwnd, &mut r) }.ok()?;
                let mut origin = POINT {
                    x: r.left,
                    y: r.top,
                };
                if !unsafe { ScreenToClient(parent, &mut origin) }.as_bool() {
                    return None;
                }
                let bounds = Rect::new(origin.x, origin.y, r.right - r.left, r.bottom - r.top);
                Some(window_info(hwnd, bounds))
            })
            .collect())
    }

    fn client_size(&self, surface: Surface) -> Result<Size> {
        match surface {
            Surface::Desktop => {
                let (w, h) = unsafe { (GetSystemMetrics(SM_CXSCREEN), GetSystemMetrics(SM_CYSCREEN)) };
                Ok(Size::new(w.max(0) as u32, h.max(0) as u32))
            }
            Surface::Window(id) => {
                let hwnd = live_hwnd(id)?;
                let mut r = RECT::default();
                unsafe { GetClientRect(hwnd, &mut r) }.map_err(|_| CaptureError::HandleInvalid)?;
                Ok(Size::new(
                    (r.right - r.left).max(0) as u32,
                    (r.bottom - r.top).max(0) as u32,
                ))
            }
        }
    }

    fn capture(&self, surface: Surface, rect: Rect) -> Result<PixelBuffer> {
        match surface {
            Surface::Desktop => unsafe {
                let mut canvas = Canvas::new(rect.width, rect.height)?;
                BitBlt(
                    canvas.dc,
                    0,
                    0,
                    rect.width,
                    rect.height,
                    canvas.screen,
                    rect.x,
                    rect.y,
                    SRCCOPY,
                )
                .map_err(|e| CaptureError::FrameAcquisition(format!("BitBlt failed: {}", e)))?;
                let bytes = canvas.read_bgra()?;
                trace!("copied {} from the screen", rect);
                Ok(PixelBuffer {
                    width: rect.width as u32,
                    height: rect.height as u32,
                    stride: rect.width as usize * 4,
                    channel_order: ChannelOrder::Bgra,
                    bytes,
                })
            },
            Surface::Window(id) => {
                let hwnd = live_hwnd(id)?;
                let client = self.client_size(surface)?;
                if client.width == 0 || client.height == 0 {
                    return Err(CaptureError::FrameAcquisition(
                        "window has an empty client area (minimized?)".to_string(),
                    ));
                }
                // The window may have shrunk since the region was validated.
                if rect.x as i64 + rect.width as i64 > client.width as i64
                    || rect.y as i64 + rect.height as i64 > client.height as i64
                {
                    return Err(CaptureError::FrameAcquisition(format!(
                        "{} no longer fits the {}x{} client area",
                        rect, client.width, client.height
                    )));
                }

                unsafe {
                    let mut canvas = Canvas::new(client.width as i32, client.height as i32)?;
                    let flags = PRINT_WINDOW_FLAGS(PW_CLIENTONLY.0 | PW_RENDERFULLCONTENT.0);
                    if !PrintWindow(hwnd, canvas.dc, flags).as_bool() {
                        // A window that vanished mid-call also lands here.
                        return Err(if IsWindow(hwnd).as_bool() {
                            CaptureError::AccessDenied
                        } else {
                            CaptureError::HandleInvalid
                        });
                    }
                    let full = canvas.read_bgra()?;
                    trace!("printed window {:?} ({}x{})", id, client.width, client.height);
                    Ok(crop_bgra(&full, client.width as i32, rect))
                }
            }
        }
    }
}
