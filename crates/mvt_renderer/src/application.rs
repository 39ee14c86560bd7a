//! Application shell: window, renderer and the main loop driving them

use thiserror::Error;

use crate::assets::AssetError;
use crate::config::ConfigError;
use crate::core::config::ApplicationConfig;
use crate::render::backends::vulkan::{VulkanError, VulkanRenderer, VulkanResult};
use crate::render::{EventKind, Window, WindowError};
use crate::shader::{CompileError, ShaderCompiler};

/// Top-level application errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Vulkan setup or frame failure
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] VulkanError),

    /// Window creation failed
    #[error("Window error: {0}")]
    Window(#[from] WindowError),

    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The shader compiler could not be started
    #[error("Shader compiler error: {0}")]
    Compiler(#[from] CompileError),

    /// Asset loading failed
    #[error("Asset error: {0}")]
    Asset(#[from] AssetError),
}

/// What the main loop drives each iteration
pub trait RenderBackend {
    /// Render and present one frame
    fn draw_frame(&mut self) -> VulkanResult<()>;

    /// Block until the GPU is idle
    fn wait_idle(&mut self) -> VulkanResult<()>;

    /// Rebuild the swapchain for `framebuffer_size` once the next frame is presented
    fn request_swapchain_rebuild(&mut self, framebuffer_size: (u32, u32));

    /// Swap in a recompiled pipeline if the shader source changed
    fn reload_pipeline(&mut self) -> VulkanResult<bool>;
}

impl RenderBackend for VulkanRenderer {
    fn draw_frame(&mut self) -> VulkanResult<()> {
        Self::draw_frame(self).map(|_| ())
    }

    fn wait_idle(&mut self) -> VulkanResult<()> {
        Self::wait_idle(self)
    }

    fn request_swapchain_rebuild(&mut self, framebuffer_size: (u32, u32)) {
        Self::request_swapchain_rebuild(self, framebuffer_size);
    }

    fn reload_pipeline(&mut self) -> VulkanResult<bool> {
        self.reload_pipeline_if_changed()
    }
}

/// Whether the loop keeps going
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// Run another iteration
    Continue,
    /// Leave the loop
    Exit,
}

/// Window state the loop reacts to between iterations
#[derive(Debug, Default)]
pub struct MainLoop {
    should_close: bool,
    minimized: bool,
    rebuild_pending: bool,
}

impl MainLoop {
    /// Fresh loop state
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one window event into the loop state
    pub fn handle_event(&mut self, event: EventKind) {
        match event {
            EventKind::Quit => self.should_close = true,
            EventKind::Resized { width, height } => {
                log::debug!("[SWAPCHAIN] Framebuffer resized to {}x{}", width, height);
                self.minimized = false;
                self.rebuild_pending = true;
            }
            EventKind::Minimized => self.minimized = true,
            EventKind::Restored => {
                self.minimized = false;
                self.rebuild_pending = true;
            }
        }
    }

    /// Run one iteration against `backend`
    ///
    /// While minimized, or while the framebuffer has no area, the only work
    /// done is waiting for the device to go idle.
    pub fn tick<B: RenderBackend>(&mut self, backend: &mut B, framebuffer_size: (u32, u32)) -> VulkanResult<LoopAction> {
        if self.should_close {
            return Ok(LoopAction::Exit);
        }

        if self.minimized || framebuffer_size.0 == 0 || framebuffer_size.1 == 0 {
            backend.wait_idle()?;
            return Ok(LoopAction::Continue);
        }

        if std::mem::take(&mut self.rebuild_pending) {
            backend.request_swapchain_rebuild(framebuffer_size);
        }

        backend.reload_pipeline()?;
        backend.draw_frame()?;
        Ok(LoopAction::Continue)
    }

    /// True once a quit was requested
    pub fn should_close(&self) -> bool {
        self.should_close
    }

    /// True while the window is minimized
    pub fn is_minimized(&self) -> bool {
        self.minimized
    }
}

/// Window plus renderer, run until the window closes
pub struct Application {
    // The renderer owns the surface and must go before the window
    renderer: VulkanRenderer,
    window: Window,
    main_loop: MainLoop,
    config: ApplicationConfig,
}

impl Application {
    /// Open the window and build the renderer
    ///
    /// The configured shader search paths are registered first, starting the
    /// compiler or rebuilding its main session.
    pub fn new(config: ApplicationConfig) -> Result<Self, AppError> {
        config.validate()?;

        ShaderCompiler::configure_search_paths(&config.renderer.shaders.search_paths)?;

        let mut window = Window::new(
            &config.window.title,
            config.window.width,
            config.window.height,
            config.window.resizable,
        )?;
        let renderer = VulkanRenderer::new(&mut window, &config.renderer, &config.scene)?;

        Ok(Self {
            renderer,
            window,
            main_loop: MainLoop::new(),
            config,
        })
    }

    /// Poll, render and present until the window is closed
    pub fn run(&mut self) -> Result<(), AppError> {
        log::info!("Entering main loop");

        loop {
            for event in self.window.poll_events() {
                self.main_loop.handle_event(event);
            }

            let framebuffer_size = self.window.framebuffer_size();
            if self.main_loop.tick(&mut self.renderer, framebuffer_size)? == LoopAction::Exit {
                break;
            }
        }

        self.renderer.wait_idle()?;
        log::info!("Main loop finished after {} frames", self.renderer.frames_submitted());
        Ok(())
    }

    /// Configuration the application was started with
    pub fn config(&self) -> &ApplicationConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct MockBackend {
        draws: usize,
        idles: usize,
        reloads: usize,
        rebuilds: Vec<(u32, u32)>,
    }

    impl RenderBackend for MockBackend {
        fn draw_frame(&mut self) -> VulkanResult<()> {
            self.draws += 1;
            Ok(())
        }

        fn wait_idle(&mut self) -> VulkanResult<()> {
            self.idles += 1;
            Ok(())
        }

        fn request_swapchain_rebuild(&mut self, framebuffer_size: (u32, u32)) {
            self.rebuilds.push(framebuffer_size);
        }

        fn reload_pipeline(&mut self) -> VulkanResult<bool> {
            self.reloads += 1;
            Ok(false)
        }
    }

    const SIZE: (u32, u32) = (1600, 900);

    #[test]
    fn test_draws_every_iteration() {
        let mut main_loop = MainLoop::new();
        let mut backend = MockBackend::default();

        for _ in 0..3 {
            assert_eq!(main_loop.tick(&mut backend, SIZE).unwrap(), LoopAction::Continue);
        }

        assert_eq!(backend.draws, 3);
        assert_eq!(backend.reloads, 3);
        assert_eq!(backend.idles, 0);
    }

    #[test]
    fn test_minimized_only_waits_idle() {
        let mut main_loop = MainLoop::new();
        let mut backend = MockBackend::default();
        main_loop.handle_event(EventKind::Minimized);

        for _ in 0..5 {
            assert_eq!(main_loop.tick(&mut backend, SIZE).unwrap(), LoopAction::Continue);
        }

        assert!(main_loop.is_minimized());
        assert_eq!(backend.draws, 0);
        assert_eq!(backend.reloads, 0);
        assert!(backend.rebuilds.is_empty());
        assert_eq!(backend.idles, 5);
    }

    #[test]
    fn test_zero_sized_framebuffer_counts_as_minimized() {
        let mut main_loop = MainLoop::new();
        let mut backend = MockBackend::default();

        main_loop.tick(&mut backend, (0, 900)).unwrap();
        assert_eq!(backend.draws, 0);
        assert_eq!(backend.idles, 1);
    }

    #[test]
    fn test_restore_requests_rebuild_once() {
        let mut main_loop = MainLoop::new();
        let mut backend = MockBackend::default();
        main_loop.handle_event(EventKind::Minimized);
        main_loop.tick(&mut backend, SIZE).unwrap();

        main_loop.handle_event(EventKind::Restored);
        main_loop.tick(&mut backend, SIZE).unwrap();
        main_loop.tick(&mut backend, SIZE).unwrap();

        assert_eq!(backend.rebuilds, vec![SIZE]);
        assert_eq!(backend.draws, 2);
    }

    #[test]
    fn test_resize_passes_current_framebuffer_size() {
        let mut main_loop = MainLoop::new();
        let mut backend = MockBackend::default();
        main_loop.handle_event(EventKind::Resized { width: 800, height: 600 });

        main_loop.tick(&mut backend, (800, 600)).unwrap();
        assert_eq!(backend.rebuilds, vec![(800, 600)]);
        assert_eq!(backend.draws, 1);
    }

    #[test]
    fn test_quit_exits_without_drawing() {
        let mut main_loop = MainLoop::new();
        let mut backend = MockBackend::default();
        main_loop.handle_event(EventKind::Quit);

        assert_eq!(main_loop.tick(&mut backend, SIZE).unwrap(), LoopAction::Exit);
        assert!(main_loop.should_close());
        assert_eq!(backend.draws, 0);
    }
}
