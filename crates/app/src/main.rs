use std::path::{Path, PathBuf};

use bean_field_core::{
    generate, params, AppConfig, BeanError, BeanVariant, ModeRequest, RenderContext, RenderGraph,
    Viewport,
};
use clap::{Parser, Subcommand};
use rand::{rngs::StdRng, SeedableRng};
use tracing_subscriber::EnvFilter;

fn main() -> bean_field_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Mesh { variant, output } => run_mesh(&config, variant, output.as_deref()),
        Commands::Render {
            frames,
            width,
            height,
            focus_at,
            set,
            output,
        } => run_render(
            config,
            RenderOptions {
                seed: cli.seed,
                frames,
                viewport: Viewport::new(width, height),
                focus_at,
                assignments: set,
                output,
            },
        ),
        Commands::Config => {
            println!("{}", config.to_json_pretty()?);
            Ok(())
        }
        Commands::Params => {
            list_params(&config);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> bean_field_core::Result<AppConfig> {
    match path {
        Some(path) => AppConfig::from_json_file(path),
        None => Ok(AppConfig::default()),
    }
}

fn run_mesh(
    config: &AppConfig,
    variant: Option<BeanVariant>,
    output: Option<&Path>,
) -> bean_field_core::Result<()> {
    let variant = variant.unwrap_or(config.shape.variant);
    let mesh = generate(&config.shape, variant);
    tracing::info!(
        variant = variant.as_str(),
        vertices = mesh.vertex_count(),
        triangles = mesh.triangle_count(),
        "generated bean mesh"
    );
    let obj = mesh.to_obj();
    match output {
        Some(path) => std::fs::write(path, obj)?,
        None => print!("{obj}"),
    }
    Ok(())
}

struct RenderOptions {
    seed: Option<u64>,
    frames: u32,
    viewport: Viewport,
    focus_at: Option<u32>,
    assignments: Vec<String>,
    output: PathBuf,
}

fn run_render(config: AppConfig, options: RenderOptions) -> bean_field_core::Result<()> {
    let rng = match options.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let Some(mut ctx) = RenderContext::mount(config, Some(options.viewport), rng)? else {
        return Ok(());
    };

    for assignment in &options.assignments {
        let (key, value) = params::parse_assignment(assignment)?;
        let effect = ctx.set_param(&key, value)?;
        tracing::info!(%key, ?effect, "applied parameter override");
    }

    let dt = 1.0 / bean_field_core::scene::NOMINAL_FPS;
    for frame in 0..options.frames {
        if options.focus_at == Some(frame) {
            match ctx.set_focus(true) {
                ModeRequest::Started(state) => tracing::info!(frame, ?state, hero = ?ctx.hero(), "focus requested"),
                other => tracing::warn!(frame, ?other, "focus request not honoured"),
            }
        }
        ctx.frame(dt);
    }

    let frame = RenderGraph::new().draw(&ctx)?;
    let image = image::RgbaImage::from_raw(
        frame.width() as u32,
        frame.height() as u32,
        frame.to_rgba8(),
    )
    .ok_or_else(|| BeanError::Render("frame size does not match its pixel data".into()))?;
    image
        .save(&options.output)
        .map_err(|e| BeanError::Render(e.to_string()))?;
    tracing::info!(
        output = %options.output.display(),
        frames = options.frames,
        mode = ?ctx.mode(),
        "wrote frame"
    );
    Ok(())
}

fn list_params(config: &AppConfig) {
    for descriptor in params::descriptors() {
        println!(
            "{:<22} {:<6} {:<40} {}",
            descriptor.key,
            format!("{:?}", descriptor.group),
            format!("{:?}", descriptor.kind),
            descriptor.get(config)
        );
    }
}

fn parse_variant(value: &str) -> Result<BeanVariant, String> {
    BeanVariant::parse(value).ok_or_else(|| format!("unknown variant `{value}`"))
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Toon-shaded coffee bean field", long_about = None)]
struct Cli {
    /// JSON preset to start from; missing keys fall back to defaults.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Seed for spawn positions, velocities and themes.
    #[arg(long, global = true)]
    seed: Option<u64>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Export the bean mesh as Wavefront OBJ.
    Mesh {
        /// `classic` or `superellipse`; defaults to the configured variant.
        #[arg(long, value_parser = parse_variant)]
        variant: Option<BeanVariant>,
        /// Output file. Writes to stdout when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Simulate the scene headlessly and save the last frame as PNG.
    Render {
        #[arg(long, default_value_t = 120)]
        frames: u32,
        #[arg(long, default_value_t = 1280)]
        width: u32,
        #[arg(long, default_value_t = 720)]
        height: u32,
        /// Frame at which to request single-bean focus.
        #[arg(long)]
        focus_at: Option<u32>,
        /// Parameter override as `key=value`; repeatable.
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
        #[arg(short, long, default_value = "bean-field.png")]
        output: PathBuf,
    },
    /// Print the effective configuration as JSON.
    Config,
    /// List every live parameter with its current value.
    Params,
}
