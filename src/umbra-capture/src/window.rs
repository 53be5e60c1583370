//! Window targets and their resolution to handles

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::backend::CaptureBackend;
use crate::error::{CaptureError, Result};
use crate::region::Rect;

/// Backend-specific identifier of a live window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowId(pub u64);

/// Snapshot of one enumerated window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowInfo {
    pub id: WindowId,
    pub title: String,
    pub class_name: String,
    /// Screen rectangle for top-level windows, parent-client rectangle for children
    pub bounds: Rect,
}

/// Identifies a window by exact title and/or class name.
///
/// An absent criterion matches anything. With neither present the target
/// denotes the whole display.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowTarget {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, rename = "class")]
    pub class_name: Option<String>,
}

impl WindowTarget {
    pub fn new(title: Option<String>, class_name: Option<String>) -> Self {
        Self { title, class_name }
    }

    /// Target for the entire display surface
    pub fn desktop() -> Self {
        Self::default()
    }

    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            class_name: None,
        }
    }

    pub fn is_desktop(&self) -> bool {
        self.title.is_none() && self.class_name.is_none()
    }

    /// Case-sensitive exact match on every present criterion
    pub fn matches(&self, window: &WindowInfo) -> bool {
        self.title.as_deref().map_or(true, |t| t == window.title)
            && self
                .class_name
                .as_deref()
                .map_or(true, |c| c == window.class_name)
    }
}

impl fmt::Display for WindowTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.title, &self.class_name) {
            (None, None) => write!(f, "the desktop"),
            (Some(title), None) => write!(f, "title {:?}", title),
            (None, Some(class)) => write!(f, "class {:?}", class),
            (Some(title), Some(class)) => write!(f, "title {:?} and class {:?}", title, class),
        }
    }
}

/// Surface a backend captures from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    Desktop,
    Window(WindowId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ChildScope {
    target: WindowTarget,
    id: WindowId,
}

/// A resolved target, owned by the session that resolved it
#[derive(Debug, PartialEq, Eq)]
pub struct WindowHandle {
    target: WindowTarget,
    surface: Surface,
    child: Option<ChildScope>,
}

impl WindowHandle {
    /// Target this handle was resolved from
    pub fn target(&self) -> &WindowTarget {
        &self.target
    }

    pub fn surface(&self) -> Surface {
        self.surface
    }

    pub fn is_desktop(&self) -> bool {
        self.surface == Surface::Desktop
    }

    /// Child window the caller's coordinates are relative to, if any
    pub fn child(&self) -> Option<(&WindowTarget, WindowId)> {
        self.child.as_ref().map(|c| (&c.target, c.id))
    }
}

/// Current capturable area of a handle, in the surface's client coordinates.
///
/// For a plain window this is `(0, 0, client width, client height)`; for a
/// child scope it is the part of the child's rectangle that lies inside the
/// parent's client area, zero-sized when none of it does.
pub fn scope_bounds(backend: &dyn CaptureBackend, handle: &WindowHandle) -> Result<Rect> {
    let size = backend.client_size(handle.surface)?;
    let client = Rect::new(0, 0, size.width as i32, size.height as i32);
    match (&handle.child, handle.surface) {
        (Some(child), Surface::Window(parent)) => backend
            .enumerate_children(parent)?
            .into_iter()
            .find(|w| w.id == child.id)
            .map(|w| w.bounds.intersect(&client))
            .ok_or(CaptureError::HandleInvalid),
        _ => Ok(client),
    }
}

/// Resolves [`WindowTarget`]s against the backend's live window list
pub struct WindowLocator {
    backend: Arc<dyn CaptureBackend>,
}

impl WindowLocator {
    pub fn new(backend: Arc<dyn CaptureBackend>) -> Self {
        Self { backend }
    }

    /// Enumerate live top-level windows in the backend's stable order
    pub fn list(&self) -> Result<Vec<WindowInfo>> {
        self.backend.enumerate()
    }

    /// Resolve a target; the first match in enumeration order wins
    pub fn resolve(&self, target: &WindowTarget) -> Result<WindowHandle> {
        self.resolve_scoped(target, None)
    }

    /// Resolve a target and, optionally, a child window inside it
    pub fn resolve_scoped(
        &self,
        target: &WindowTarget,
        child: Option<&WindowTarget>,
    ) -> Result<WindowHandle> {
        if target.is_desktop() {
            if let Some(child) = child {
                return Err(CaptureError::WindowNotFound(format!(
                    "child {} (a child scope needs a window target)",
                    child
                )));
            }
            info!("resolved target to {}", target);
            return Ok(WindowHandle {
                target: target.clone(),
                surface: Surface::Desktop,
                child: None,
            });
        }

        let windows = self.backend.enumerate()?;
        debug!("matching {} against {} windows", target, windows.len());

        let window = windows
            .iter()
            .find(|w| target.matches(w))
            .ok_or_else(|| CaptureError::WindowNotFound(target.to_string()))?;

        info!(
            "resolved {} to window {:?} ({:?} / {:?})",
            target, window.id, window.title, window.class_name
        );

        let child = match child {
            Some(child_target) => {
                let children = self.backend.enumerate_children(window.id)?;
                let found = children
                    .iter()
                    .find(|w| child_target.matches(w))
                    .ok_or_else(|| {
                        CaptureError::WindowNotFound(format!(
                            "child {} of {}",
                            child_target, target
                        ))
                    })?;
                debug!("child scope {:?} at {}", found.id, found.bounds);
                Some(ChildScope {
                    target: child_target.clone(),
                    id: found.id,
                })
            }
            None => None,
        };

        Ok(WindowHandle {
            target: target.clone(),
            surface: Surface::Window(window.id),
            child,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::{MemoryBackend, MemoryWindow};
    use crate::region::Size;

    fn backend() -> Arc<MemoryBackend> {
        let backend = MemoryBackend::new(Size::new(1920, 1080));
        backend.add_window(MemoryWindow::new(1, "Notepad", "Edit", Size::new(640, 480)));
        backend.add_window(MemoryWindow::new(2, "001 - VMware Workstation", "VMUIFrame", Size::new(1024, 768)));
        backend.add_window(MemoryWindow::new(3, "Notepad", "Notepad", Size::new(300, 200)));
        backend.add_child(
            WindowId(2),
            MemoryWindow::new(20, "", "MKSWindow#0", Size::new(800, 600)),
            Rect::new(12, 40, 800, 600),
        );
        Arc::new(backend)
    }

    #[test]
    fn test_first_match_in_enumeration_order_wins() {
        let locator = WindowLocator::new(backend());
        let handle = locator.resolve(&WindowTarget::titled("Notepad")).unwrap();
        assert_eq!(handle.surface(), Surface::Window(WindowId(1)));

        let handle = locator
            .resolve(&WindowTarget::new(Some("Notepad".into()), Some("Notepad".into())))
            .unwrap();
        assert_eq!(handle.surface(), Surface::Window(WindowId(3)));
    }

    #[test]
    fn test_matching_is_exact_and_case_sensitive() {
        let locator = WindowLocator::new(backend());
        for target in [
            WindowTarget::titled("notepad"),
            WindowTarget::titled("Note"),
            WindowTarget::new(None, Some("edit".into())),
        ] {
            assert!(matches!(
                locator.resolve(&target),
                Err(CaptureError::WindowNotFound(_))
            ));
        }
    }

    #[test]
    fn test_nonexistent_title_is_not_found() {
        let locator = WindowLocator::new(backend());
        let err = locator
            .resolve(&WindowTarget::titled("nonexistent-xyz"))
            .unwrap_err();
        assert!(matches!(err, CaptureError::WindowNotFound(ref what) if what.contains("nonexistent-xyz")));
    }

    #[test]
    fn test_empty_target_is_the_desktop() {
        let backend = backend();
        let locator = WindowLocator::new(backend.clone());
        let handle = locator.resolve(&WindowTarget::desktop()).unwrap();
        assert!(handle.is_desktop());
        assert_eq!(
            scope_bounds(backend.as_ref(), &handle).unwrap(),
            Rect::new(0, 0, 1920, 1080)
        );
    }

    #[test]
    fn test_child_scope_bounds() {
        let backend = backend();
        let locator = WindowLocator::new(backend.clone());
        let child = WindowTarget::new(None, Some("MKSWindow#0".into()));
        let handle = locator
            .resolve_scoped(&WindowTarget::titled("001 - VMware Workstation"), Some(&child))
            .unwrap();

        assert_eq!(handle.child().map(|(_, id)| id), Some(WindowId(20)));
        assert_eq!(
            scope_bounds(backend.as_ref(), &handle).unwrap(),
            Rect::new(12, 40, 800, 600)
        );

        let missing = WindowTarget::new(None, Some("Nope".into()));
        assert!(locator
            .resolve_scoped(&WindowTarget::titled("001 - VMware Workstation"), Some(&missing))
            .is_err());
    }

    #[test]
    fn test_child_scope_is_clipped_to_parent() {
        let backend = backend();
        backend.add_child(
            WindowId(3),
            MemoryWindow::new(30, "", "Overhang", Size::new(100, 80)),
            Rect::new(250, 150, 100, 80),
        );
        backend.add_child(
            WindowId(3),
            MemoryWindow::new(31, "", "Offscreen", Size::new(40, 40)),
            Rect::new(500, 0, 40, 40),
        );
        let locator = WindowLocator::new(backend.clone());
        let parent = WindowTarget::new(Some("Notepad".into()), Some("Notepad".into()));

        let handle = locator
            .resolve_scoped(&parent, Some(&WindowTarget::new(None, Some("Overhang".into()))))
            .unwrap();
        assert_eq!(
            scope_bounds(backend.as_ref(), &handle).unwrap(),
            Rect::new(250, 150, 50, 50)
        );

        let handle = locator
            .resolve_scoped(&parent, Some(&WindowTarget::new(None, Some("Offscreen".into()))))
            .unwrap();
        assert_eq!(scope_bounds(backend.as_ref(), &handle).unwrap().area(), 0);
    }

    #[test]
    fn test_closed_window_invalidates_scope() {
        let backend = backend();
        let locator = WindowLocator::new(backend.clone());
        let handle = locator.resolve(&WindowTarget::titled("Notepad")).unwrap();
        backend.close_window(WindowId(1));
        assert!(matches!(
            scope_bounds(backend.as_ref(), &handle),
            Err(CaptureError::HandleInvalid)
        ));
    }

    #[test]
    fn test_target_display() {
        assert_eq!(WindowTarget::desktop().to_string(), "the desktop");
        assert_eq!(
            WindowTarget::new(Some("a".into()), Some("b".into())).to_string(),
            "title \"a\" and class \"b\""
        );
    }
}
