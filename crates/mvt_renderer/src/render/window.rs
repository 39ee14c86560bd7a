//! Window management using GLFW
//!
//! Provides the window, its Vulkan surface, and the reduced event set the
//! main loop reacts to.

use thiserror::Error;

/// Window management errors
#[derive(Error, Debug)]
pub enum WindowError {
    /// GLFW could not be initialized
    #[error("GLFW initialization failed")]
    InitializationFailed,

    /// The window could not be created
    #[error("Window creation failed")]
    CreationFailed,

    /// Any other GLFW failure
    #[error("GLFW error: {0}")]
    GlfwError(String),
}

/// Result type for window operations
pub type WindowResult<T> = Result<T, WindowError>;

/// Events the renderer cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// The user asked to close the window
    Quit,
    /// The framebuffer changed size
    Resized {
        /// New framebuffer width in pixels
        width: u32,
        /// New framebuffer height in pixels
        height: u32,
    },
    /// The window was iconified or shrunk to nothing
    Minimized,
    /// The window is visible again
    Restored,
}

impl EventKind {
    /// Translate a GLFW event, dropping the ones the renderer ignores
    pub fn from_glfw(event: &glfw::WindowEvent) -> Option<Self> {
        match *event {
            glfw::WindowEvent::Close => Some(Self::Quit),
            glfw::WindowEvent::FramebufferSize(width, height) => {
                if width <= 0 || height <= 0 {
                    Some(Self::Minimized)
                } else {
                    Some(Self::Resized {
                        width: width as u32,
                        height: height as u32,
                    })
                }
            }
            glfw::WindowEvent::Iconify(true) => Some(Self::Minimized),
            glfw::WindowEvent::Iconify(false) | glfw::WindowEvent::Maximize(true) => Some(Self::Restored),
            _ => None,
        }
    }
}

/// GLFW window wrapper with proper resource management
pub struct Window {
    glfw: glfw::Glfw,
    window: glfw::PWindow,
    events: glfw::GlfwReceiver<(f64, glfw::WindowEvent)>,
}

impl Window {
    /// Create a window without a client API, ready for a Vulkan surface
    pub fn new(title: &str, width: u32, height: u32, resizable: bool) -> WindowResult<Self> {
        let mut glfw = glfw::init(glfw::fail_on_errors)
            .map_err(|_| WindowError::InitializationFailed)?;

        if !glfw.vulkan_supported() {
            return Err(WindowError::GlfwError("Vulkan loader not found".to_string()));
        }

        glfw.window_hint(glfw::WindowHint::ClientApi(glfw::ClientApiHint::NoApi));
        glfw.window_hint(glfw::WindowHint::Resizable(resizable));

        let (mut window, events) = glfw
            .create_window(width, height, title, glfw::WindowMode::Windowed)
            .ok_or(WindowError::CreationFailed)?;

        window.set_close_polling(true);
        window.set_framebuffer_size_polling(true);
        window.set_iconify_polling(true);
        window.set_maximize_polling(true);

        log::info!("Created window '{}' ({}x{})", title, width, height);

        Ok(Self {
            glfw,
            window,
            events,
        })
    }

    /// Pump the GLFW queue and return the translated events
    pub fn poll_events(&mut self) -> Vec<EventKind> {
        self.glfw.poll_events();
        glfw::flush_messages(&self.events)
            .filter_map(|(_, event)| EventKind::from_glfw(&event))
            .collect()
    }

    /// Framebuffer size in pixels
    pub fn framebuffer_size(&self) -> (u32, u32) {
        let (width, height) = self.window.get_framebuffer_size();
        (width.max(0) as u32, height.max(0) as u32)
    }

    /// Get required Vulkan instance extensions from GLFW
    pub fn required_instance_extensions(&self) -> WindowResult<Vec<String>> {
        self.glfw
            .get_required_instance_extensions()
            .ok_or_else(|| WindowError::GlfwError("Failed to get required extensions".to_string()))
    }

    /// Create Vulkan surface using GLFW's built-in functionality
    pub fn create_vulkan_surface(&mut self, instance: ash::vk::Instance) -> WindowResult<ash::vk::SurfaceKHR> {
        let mut surface = ash::vk::SurfaceKHR::null();
        let result = self.window.create_window_surface(instance, std::ptr::null(), &mut surface);

        if result == ash::vk::Result::SUCCESS {
            Ok(surface)
        } else {
            Err(WindowError::GlfwError(format!("Failed to create Vulkan surface: {:?}", result)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glfw::WindowEvent;

    #[test]
    fn test_close_maps_to_quit() {
        assert_eq!(EventKind::from_glfw(&WindowEvent::Close), Some(EventKind::Quit));
    }

    #[test]
    fn test_framebuffer_resize() {
        assert_eq!(
            EventKind::from_glfw(&WindowEvent::FramebufferSize(800, 600)),
            Some(EventKind::Resized { width: 800, height: 600 })
        );
        assert_eq!(
            EventKind::from_glfw(&WindowEvent::FramebufferSize(0, 600)),
            Some(EventKind::Minimized)
        );
    }

    #[test]
    fn test_iconify_and_restore() {
        assert_eq!(EventKind::from_glfw(&WindowEvent::Iconify(true)), Some(EventKind::Minimized));
        assert_eq!(EventKind::from_glfw(&WindowEvent::Iconify(false)), Some(EventKind::Restored));
        assert_eq!(EventKind::from_glfw(&WindowEvent::Maximize(true)), Some(EventKind::Restored));
        assert_eq!(EventKind::from_glfw(&WindowEvent::Maximize(false)), None);
    }

    #[test]
    fn test_ignored_events() {
        assert_eq!(EventKind::from_glfw(&WindowEvent::Focus(true)), None);
        assert_eq!(EventKind::from_glfw(&WindowEvent::Pos(10, 10)), None);
    }
}
