use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;

use overlaypal::{CmplConfig, CmplSolver, Color, ConvertParams, Hardware, Image, OverlayOptimiser};

/// Split an indexed image into a palette-limited background and sprites
#[derive(Parser, Debug)]
#[command(name = "overlaypal", version)]
struct Args {
    /// Indexed PNG to convert
    input: PathBuf,

    /// Where to write the composited indexed PNG
    #[arg(short, long)]
    output: PathBuf,

    /// Source colour index treated as transparent
    #[arg(long, default_value_t = 0)]
    background_color: Color,

    #[arg(long, default_value_t = 16)]
    cell_width: usize,

    #[arg(long, default_value_t = 16)]
    cell_height: usize,

    #[arg(long, default_value_t = 16)]
    sprite_height: usize,

    /// Colours per cell, not counting transparency
    #[arg(long, default_value_t = 3)]
    cell_color_limit: usize,

    #[arg(long, default_value_t = 4)]
    max_background_palettes: usize,

    #[arg(long, default_value_t = 4)]
    max_sprite_palettes: usize,

    #[arg(long, default_value_t = 8)]
    max_sprites_per_scanline: usize,

    /// Solver time budget per pass in seconds, 0 for none
    #[arg(long, default_value_t = 0)]
    timeout: u32,

    /// TOML file overriding the default (NES) hardware profile
    #[arg(long)]
    hardware: Option<PathBuf>,

    /// The cmpl executable
    #[arg(long, default_value = "cmpl")]
    cmpl: PathBuf,

    /// Directory holding firstPass.cmpl and secondPass.cmpl
    #[arg(long, default_value = "models")]
    model_dir: PathBuf,

    /// Directory for solver intermediate files [default: <tmp>/overlaypal]
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

/// An indexed image with the RGB palette it was stored with.
struct IndexedPng {
    image: Image,
    rgb: Vec<[u8; 3]>,
}

fn read_indexed_png(path: &Path) -> Result<IndexedPng> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut decoder = png::Decoder::new(file);
    decoder.set_transformations(png::Transformations::IDENTITY);
    let mut reader = decoder.read_info().with_context(|| format!("reading {}", path.display()))?;
    let mut buf = vec![0; reader.output_buffer_size()];
    let frame = reader.next_frame(&mut buf).with_context(|| format!("decoding {}", path.display()))?;
    if frame.color_type != png::ColorType::Indexed {
        bail!("{} is {:?}, not an indexed PNG", path.display(), frame.color_type);
    }

    let depth = frame.bit_depth as usize;
    let mask = ((1u16 << depth) - 1) as u8;
    let (width, height) = (frame.width as usize, frame.height as usize);
    let mut pixels = Vec::with_capacity(width * height);
    for row in buf.chunks(frame.line_size).take(height) {
        for x in 0..width {
            let bit = x * depth;
            // pixels are packed from the most significant bit
            let shift = 8 - depth - bit % 8;
            pixels.push((row[bit / 8] >> shift) & mask);
        }
    }

    let rgb = reader.info().palette.as_deref().unwrap_or_default().chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect();
    Ok(IndexedPng { image: Image::from_vec(width, height, pixels)?, rgb })
}

fn write_indexed_png(path: &Path, image: &Image, palette: &[[u8; 3]]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), image.width() as u32, image.height() as u32);
    encoder.set_color(png::ColorType::Indexed);
    encoder.set_depth(png::BitDepth::Eight);
    encoder.set_palette(palette.concat());
    encoder.set_trns(vec![0]);
    encoder
        .write_header()?
        .write_image_data(&image.to_vec())
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

fn load_hardware(path: Option<&Path>) -> Result<Hardware> {
    let Some(path) = path else {
        return Ok(Hardware::default());
    };
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("parsing hardware profile {}", path.display()))
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(if args.verbose { "debug" } else { "info" })).init();

    let hardware = load_hardware(args.hardware.as_deref())?;
    let source = read_indexed_png(&args.input)?;
    info!("read {}x{} image from {}", source.image.width(), source.image.height(), args.input.display());

    let work_dir = args.work_dir.unwrap_or_else(|| std::env::temp_dir().join("overlaypal"));
    fs::create_dir_all(&work_dir).with_context(|| format!("creating {}", work_dir.display()))?;
    let solver = CmplSolver::new(CmplConfig { executable: args.cmpl, model_dir: args.model_dir, work_dir });

    let params = ConvertParams {
        background_color: args.background_color,
        cell_width: args.cell_width,
        cell_height: args.cell_height,
        sprite_height: args.sprite_height,
        cell_color_limit: args.cell_color_limit,
        max_background_palettes: args.max_background_palettes,
        max_sprite_palettes: args.max_sprite_palettes,
        max_sprites_per_scanline: args.max_sprites_per_scanline,
        timeout_seconds: args.timeout,
    };
    let mut optimiser = OverlayOptimiser::new(solver, hardware);
    let status = optimiser.convert(&source.image, &params)?;
    let Some(conversion) = optimiser.conversion() else {
        bail!("conversion produced no result");
    };

    // slot p * G + r shows the r-th colour of palette p; slot 0 keeps the source background
    let group_size = hardware.palette_group_size;
    let rgb_of = |c: Color| source.rgb.get(usize::from(c)).copied().unwrap_or_default();
    let mut palette = vec![[0; 3]; hardware.num_palettes() * group_size];
    palette[0] = rgb_of(params.background_color);
    for (p, colors) in conversion.palettes().iter().enumerate() {
        for (rank, &c) in colors.iter().enumerate() {
            palette[p * group_size + rank + 1] = rgb_of(c);
        }
        if !colors.is_empty() {
            let kind = if p < hardware.num_background_palettes { "background" } else { "sprite" };
            println!("{kind} palette {p}: {colors:?}");
        }
    }
    write_indexed_png(&args.output, conversion.output(), &palette)?;

    println!(
        "{} sprites ({} grid, {} free before merging), at most {} per scanline",
        conversion.sprites().len(),
        conversion.sprites_grid().len(),
        conversion.sprites_free().len(),
        conversion.max_sprites_per_scanline()
    );
    if status.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("{status}");
        Ok(ExitCode::FAILURE)
    }
}
