//! Anaglyph: side-by-side stereo video to anaglyph 3D CLI.

mod config_utils;

use anaglyph::config::{Config, ConfigChange};
use anaglyph::output::{ImageOutput, OutputBackend, Presenter};
use anaglyph::pipeline::{ControllerState, PipelineController, Slot, UniformValue};
use anaglyph::shader::{AnaglyphMethod, FilterChoice, GpuContext, GpuTexture, WgpuBackend};
use anaglyph::utils::{FramePacer, PlaybackClock};
use anaglyph::video::StereoSource;
use anyhow::{anyhow, Result};
use clap::Parser;
use config_utils::ConfigWatcher;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowAttributes, WindowId};

type Controller = PipelineController<WgpuBackend, StereoSource>;

const SIGMA_STEP: f32 = 0.1;
const SEEK_STEP: f32 = 10.0;
const LOAD_TIMEOUT: Duration = Duration::from_secs(10);

/// Side-by-side stereo video to anaglyph 3D.
#[derive(Parser, Debug)]
#[command(name = "anaglyph")]
#[command(about = "Turn side-by-side stereo video into anaglyph 3D on the GPU")]
struct Args {
    /// Side-by-side video or image
    #[arg(short, long)]
    video: Option<PathBuf>,

    /// YAML config file, reloaded on change
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Anaglyph method, e.g. trueAnaglyphs or optimizedAnaglyphs
    #[arg(short, long)]
    anaglyph: Option<AnaglyphMethod>,

    /// Filter for the next slot, repeatable
    #[arg(short, long)]
    filter: Vec<FilterChoice>,

    /// Number of filter slots in the processed pipeline
    #[arg(long, default_value = "2")]
    filter_slots: usize,

    /// Window width
    #[arg(long, default_value = "960")]
    width: u32,

    /// Window height
    #[arg(long, default_value = "1080")]
    height: u32,

    /// Target frames per second
    #[arg(long, default_value = "30")]
    fps: u32,

    /// Render off-screen and write PNGs instead of opening a window
    #[arg(long)]
    headless: bool,

    /// Frames to render in headless mode
    #[arg(long, default_value = "1")]
    frames: u32,

    /// PNG written in headless mode
    #[arg(short, long, default_value = "anaglyph.png")]
    output: PathBuf,

    /// Also write the anaglyph-only view next to the output
    #[arg(long)]
    save_original: bool,

    /// List anaglyph methods and filters and exit
    #[arg(long)]
    list_variants: bool,
}

impl Args {
    /// Config file contents with the command line laid over them.
    fn settings(&self) -> Result<Config> {
        let mut settings = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        if let Some(video) = &self.video {
            settings.video = Some(video.clone());
        }
        if let Some(method) = self.anaglyph {
            settings.anaglyph = Some(method);
        }
        if !self.filter.is_empty() {
            settings.filters = self.filter.clone();
        }
        Ok(settings)
    }
}

/// Routes one change to the controller. Rejected changes are logged and
/// leave everything as it was.
fn apply_change(controller: &mut Controller, backend: &WgpuBackend, change: ConfigChange) {
    let result = match change {
        ConfigChange::Video(path) if controller.is_active(&path.display().to_string()) => {
            debug!("{:?} is already playing", path);
            Ok(())
        }
        ConfigChange::Video(path) => match StereoSource::open(backend, &path) {
            Ok(source) => {
                if controller.load_source(source) {
                    info!("Loading {:?}", path);
                }
                Ok(())
            }
            Err(e) => Err(anyhow!("Failed to open {:?}: {}", path, e)),
        },
        ConfigChange::Anaglyph(method) => controller.set_anaglyph(backend, method).map(|_| ()).map_err(Into::into),
        ConfigChange::Filter { slot, choice } => {
            controller.set_filter(backend, slot, choice).map(|_| ()).map_err(Into::into)
        }
        ConfigChange::Uniform { name, value } => match controller.set_uniform(&name, value) {
            Ok(stored) => {
                debug!("{} = {}", name, stored);
                Ok(())
            }
            Err(e) => Err(e.into()),
        },
    };
    if let Err(e) = result {
        warn!("Ignoring change: {}", e);
    }
}

fn new_controller(args: &Args, backend: &WgpuBackend, settings: &Config) -> Controller {
    let mut controller = Controller::new(args.filter_slots, AnaglyphMethod::default());
    for change in Config::default().diff(settings) {
        apply_change(&mut controller, backend, change);
    }
    controller
}

/// Everything that needs the window's GPU context.
struct Viewer {
    backend: WgpuBackend,
    presenter: Presenter,
    controller: Controller,
}

impl Viewer {
    fn new(args: &Args, settings: &Config, window: Arc<Window>) -> Result<Self> {
        let gpu = GpuContext::new(Some(&window))?;
        let backend = WgpuBackend::new(&gpu);
        let presenter = Presenter::new(&gpu, window)?;
        let controller = new_controller(args, &backend, settings);
        Ok(Self {
            backend,
            presenter,
            controller,
        })
    }

    fn render(&mut self, time: f32) -> Result<()> {
        if let Err(e) = self.controller.update(&self.backend, time) {
            error!("Source error: {}", e);
        }

        let mut encoder = self.backend.begin_frame();
        self.controller.render(&self.backend, &mut encoder);
        self.backend.submit(encoder);

        // Original on top, processed below.
        let views: Vec<&GpuTexture> = [Slot::Original, Slot::Processed]
            .into_iter()
            .filter_map(|slot| self.controller.display_texture(slot))
            .collect();
        self.presenter.present(&views)
    }

    fn handle_key(&mut self, event: &KeyEvent, clock: &mut PlaybackClock) {
        let backend = &self.backend;
        let controller = &mut self.controller;
        let result = match event.logical_key.as_ref() {
            Key::Named(NamedKey::Space) => {
                let paused = clock.toggle(Instant::now());
                info!("{}", if paused { "Paused" } else { "Resumed" });
                Ok(())
            }
            Key::Named(NamedKey::ArrowRight) => seek(controller, clock, SEEK_STEP),
            Key::Named(NamedKey::ArrowLeft) => seek(controller, clock, -SEEK_STEP),
            Key::Named(NamedKey::ArrowUp) => nudge(controller, "sigma", SIGMA_STEP),
            Key::Named(NamedKey::ArrowDown) => nudge(controller, "sigma", -SIGMA_STEP),
            Key::Character("[") => nudge(controller, "kernelSizeDiv2", -1.0),
            Key::Character("]") => nudge(controller, "kernelSizeDiv2", 1.0),
            Key::Character("a") | Key::Character("A") => {
                let method = controller.anaglyph().next();
                info!("Anaglyph: {}", method);
                controller.set_anaglyph(backend, method).map(|_| ())
            }
            Key::Character("1") => cycle_filter(controller, backend, 0),
            Key::Character("2") => cycle_filter(controller, backend, 1),
            Key::Character("s") | Key::Character("S") => {
                info!("Filter slot 0: {}", FilterChoice::SeparableGaussian);
                controller.set_filter(backend, 0, FilterChoice::SeparableGaussian).map(|_| ())
            }
            Key::Character("i") | Key::Character("I") => {
                let invert = matches!(controller.uniforms().get("invert"), Some(UniformValue::Bool(true)));
                controller.set_uniform("invert", UniformValue::Bool(!invert)).map(|_| ())
            }
            _ => Ok(()),
        };
        if let Err(e) = result {
            warn!("{}", e);
        }
    }
}

fn seek(controller: &mut Controller, clock: &mut PlaybackClock, delta: f32) -> anaglyph::error::PipelineResult<()> {
    let time = clock.seek(Instant::now(), delta);
    info!("Playback at {:.1}s", time);
    controller.seek(time)
}

fn nudge(controller: &mut Controller, name: &str, step: f32) -> anaglyph::error::PipelineResult<()> {
    let current = controller.uniforms().float(name).unwrap_or_default();
    let stored = controller.set_uniform(name, UniformValue::Float(current + step))?;
    info!("{} = {}", name, stored);
    Ok(())
}

fn cycle_filter(controller: &mut Controller, backend: &WgpuBackend, slot: usize) -> anaglyph::error::PipelineResult<()> {
    let Some(current) = controller.filters().get(slot).copied() else {
        return Ok(());
    };
    let next = FilterChoice::from_kind(current).cycle();
    info!("Filter slot {}: {}", slot, next);
    controller.set_filter(backend, slot, next).map(|_| ())
}

/// Application state for the event loop.
struct AnaglyphApp {
    args: Args,
    settings: Config,
    window: Option<Arc<Window>>,
    viewer: Option<Viewer>,
    watcher: Option<ConfigWatcher>,
    pacer: FramePacer,
    clock: PlaybackClock,
}

impl AnaglyphApp {
    fn new(args: Args, settings: Config) -> Self {
        let now = Instant::now();
        let pacer = FramePacer::new(args.fps, now);
        Self {
            args,
            settings,
            window: None,
            viewer: None,
            watcher: None,
            pacer,
            clock: PlaybackClock::new(now),
        }
    }

    fn process_frame(&mut self) {
        let Some(viewer) = &mut self.viewer else {
            return;
        };

        if let Some(watcher) = &mut self.watcher {
            for change in watcher.check_for_changes() {
                apply_change(&mut viewer.controller, &viewer.backend, change);
            }
        }

        let now = Instant::now();
        if let Err(e) = viewer.render(self.clock.time(now)) {
            error!("Render error: {}", e);
        }
        if let Some(fps) = self.pacer.record(now) {
            debug!("[Perf] Rendering at {:.2} FPS ({:?})", fps, viewer.controller.state());
        }
    }
}

impl ApplicationHandler for AnaglyphApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attrs = WindowAttributes::default()
            .with_title("Anaglyph")
            .with_inner_size(PhysicalSize::new(self.args.width, self.args.height));

        match event_loop.create_window(window_attrs) {
            Ok(window) => {
                let window = Arc::new(window);
                self.window = Some(window.clone());

                match Viewer::new(&self.args, &self.settings, window) {
                    Ok(viewer) => {
                        self.viewer = Some(viewer);
                        info!("Window created successfully");
                        if let Some(path) = &self.args.config {
                            self.watcher = ConfigWatcher::new(path.clone(), self.settings.clone());
                        }
                    }
                    Err(e) => {
                        error!("Failed to initialize renderer: {}", e);
                        event_loop.exit();
                    }
                }
            }
            Err(e) => {
                error!("Failed to create window: {}", e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Window closed");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(viewer) = &mut self.viewer {
                    viewer.presenter.resize(size);
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state == ElementState::Pressed {
                    if let Some(viewer) = &mut self.viewer {
                        viewer.handle_key(&event, &mut self.clock);
                    }
                }
            }
            WindowEvent::RedrawRequested => {
                if self.pacer.is_due(Instant::now()) {
                    self.process_frame();
                }
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    if args.list_variants {
        println!("Anaglyph methods:");
        for method in AnaglyphMethod::ALL {
            println!("  {}", method);
        }
        println!("Filters:");
        for choice in FilterChoice::ALL {
            println!("  {}", choice);
        }
        return Ok(());
    }

    let settings = args.settings()?;
    if settings.video.is_none() {
        warn!("No video given, nothing will be shown until one is configured");
    }

    info!("Starting Anaglyph...");

    if args.headless {
        run_headless_mode(args, settings)
    } else {
        run_window_mode(args, settings)
    }
}

/// Run in window output mode (default).
fn run_window_mode(args: Args, settings: Config) -> Result<()> {
    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = AnaglyphApp::new(args, settings);
    event_loop.run_app(&mut app)?;

    Ok(())
}

/// Render `--frames` frames off-screen and write the last one as PNG.
fn run_headless_mode(args: Args, settings: Config) -> Result<()> {
    if settings.video.is_none() {
        return Err(anyhow!("Headless mode needs --video or a config with `video`"));
    }

    let gpu = GpuContext::new(None)?;
    let backend = WgpuBackend::new(&gpu);
    let mut controller = new_controller(&args, &backend, &settings);

    let start = Instant::now();
    let clock = PlaybackClock::new(start);
    let mut pacer = FramePacer::new(args.fps, start);
    let mut rendered = 0u32;

    while rendered < args.frames.max(1) {
        let now = Instant::now();
        controller.update(&backend, clock.time(now))?;

        match controller.state() {
            ControllerState::Ready if pacer.is_due(now) => {
                let mut encoder = backend.begin_frame();
                controller.render(&backend, &mut encoder);
                backend.submit(encoder);
                rendered += 1;
                if let Some(fps) = pacer.record(now) {
                    debug!("[Perf] Rendering at {:.2} FPS", fps);
                }
            }
            ControllerState::Ready => thread::sleep(pacer.frame_duration() / 4),
            ControllerState::VideoLoading if now.duration_since(start) < LOAD_TIMEOUT => {
                thread::sleep(Duration::from_millis(5));
            }
            _ => return Err(anyhow!("Source did not produce a frame")),
        }
    }
    info!("Rendered {} frames", rendered);

    let processed = controller
        .display_texture(Slot::Processed)
        .ok_or_else(|| anyhow!("No processed pipeline"))?;
    ImageOutput::new(&args.output).write_frame(&backend.read_texture(processed)?)?;

    if args.save_original {
        let original = controller
            .display_texture(Slot::Original)
            .ok_or_else(|| anyhow!("No original pipeline"))?;
        let path = ImageOutput::with_suffix(&args.output, "original");
        ImageOutput::new(path).write_frame(&backend.read_texture(original)?)?;
    }

    Ok(())
}
