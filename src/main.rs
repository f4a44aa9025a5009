//! xrender-cursor - Main entry point
//!
//! Opens a display, builds an ARGB cursor from a solid color or a PNG file
//! and installs it on the root window until Enter is pressed.

use std::env;
use std::io::{self, BufRead};
use std::process;

use xrender_cursor::connection::display::open_display;
use xrender_cursor::cursor::convert_pixel;
use xrender_cursor::{
    define_cursor, free_cursor, try_create_cursor, Cursor, FormatCatalog, PixelBuffer, Registry,
};

/// Program version
const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_usage() {
    println!("xrender-cursor v{}", VERSION);
    println!("Install an ARGB cursor on the root window");
    println!();
    println!("Usage: xrender-cursor [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -display <name>       Display to open (default: $DISPLAY)");
    println!("  -size <n>             Cursor width and height (default: 32)");
    println!("  -hotspot <x> <y>      Cursor hotspot (default: 0 0)");
    println!("  -color <AARRGGBB>     Fill color in hex (default: c0ff4000)");
    #[cfg(feature = "png")]
    println!("  -png <file>           Load the cursor image from a PNG file");
    println!("  -info                 Print RENDER version and formats, then exit");
    println!("  -h, --help            Show this help message");
    println!();
    println!("Examples:");
    println!("  xrender-cursor -size 48 -hotspot 24 24 -color ff00ff00");
    println!("  xrender-cursor -display :1 -info");
    println!();
}

#[derive(Debug)]
struct Config {
    display: Option<String>,
    size: u32,
    hotspot: (u32, u32),
    color: u32,
    png: Option<String>,
    info: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            display: None,
            size: 32,
            hotspot: (0, 0),
            color: 0xc0ff_4000,
            png: None,
            info: false,
        }
    }
}

fn next_value<'a>(args: &'a [String], i: &mut usize, flag: &str) -> Result<&'a str, String> {
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| format!("Missing value for {}", flag))
}

fn parse_args() -> Result<Config, String> {
    let mut config = Config::default();
    let args: Vec<String> = env::args().collect();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_usage();
                process::exit(0);
            }
            "-display" => {
                config.display = Some(next_value(&args, &mut i, "-display")?.to_string());
            }
            "-size" => {
                config.size = next_value(&args, &mut i, "-size")?
                    .parse()
                    .map_err(|_| "Invalid size".to_string())?;
            }
            "-hotspot" => {
                let x = next_value(&args, &mut i, "-hotspot")?
                    .parse()
                    .map_err(|_| "Invalid hotspot x".to_string())?;
                let y = next_value(&args, &mut i, "-hotspot")?
                    .parse()
                    .map_err(|_| "Invalid hotspot y".to_string())?;
                config.hotspot = (x, y);
            }
            "-color" => {
                let value = next_value(&args, &mut i, "-color")?;
                config.color = u32::from_str_radix(value.trim_start_matches('#'), 16)
                    .map_err(|_| format!("Invalid color: {}", value))?;
            }
            #[cfg(feature = "png")]
            "-png" => {
                config.png = Some(next_value(&args, &mut i, "-png")?.to_string());
            }
            "-info" => {
                config.info = true;
            }
            arg => {
                return Err(format!("Unknown option: {}", arg));
            }
        }
        i += 1;
    }

    Ok(config)
}

/// Solid square in the buffer layout the cursor pipeline expects
fn solid_image(size: u32, argb: u32) -> Vec<u8> {
    let sample = convert_pixel(argb).to_ne_bytes();
    sample
        .iter()
        .copied()
        .cycle()
        .take(size as usize * size as usize * 4)
        .collect()
}

#[cfg(feature = "png")]
fn load_png(path: &str) -> Result<(Vec<u8>, u32, u32), String> {
    let image = image::open(path)
        .map_err(|e| format!("Failed to load {}: {}", path, e))?
        .to_rgba8();
    let (width, height) = image.dimensions();

    let mut data = Vec::with_capacity(width as usize * height as usize * 4);
    for pixel in image.pixels() {
        let [r, g, b, a] = pixel.0;
        let sample = u32::from(a) << 24 | u32::from(b) << 16 | u32::from(g) << 8 | u32::from(r);
        data.extend_from_slice(&sample.to_ne_bytes());
    }
    Ok((data, width, height))
}

#[cfg(not(feature = "png"))]
fn load_png(path: &str) -> Result<(Vec<u8>, u32, u32), String> {
    Err(format!("Cannot load {}: built without PNG support", path))
}

fn print_catalog(catalog: &FormatCatalog) {
    let version = catalog.version();
    println!("RENDER version {}.{}", version.major, version.minor);
    println!("{} picture formats:", catalog.formats().len());
    for format in catalog.formats() {
        let d = &format.direct;
        println!(
            "  0x{:08x} {:?} depth {:2}  a {:2}/{:#04x} r {:2}/{:#04x} g {:2}/{:#04x} b {:2}/{:#04x}",
            format.id.get(),
            format.kind,
            format.depth,
            d.alpha,
            d.alpha_mask,
            d.red,
            d.red_mask,
            d.green,
            d.green_mask,
            d.blue,
            d.blue_mask
        );
    }
    for (index, screen) in catalog.screens().iter().enumerate() {
        let depths: Vec<String> = catalog
            .depths(screen)
            .iter()
            .map(|d| format!("{}({})", d.depth, catalog.visuals(d).len()))
            .collect();
        println!(
            "screen {}: fallback 0x{:08x}, subpixel {:?}, depths {}",
            index,
            catalog.fallback_format(screen).id.get(),
            screen.subpixel,
            depths.join(" ")
        );
    }
}

fn run(config: Config) -> Result<(), String> {
    let mut conn = open_display(config.display.as_deref()).map_err(|e| e.to_string())?;
    let registry = Registry::global();

    if config.info {
        let entry = registry.get_or_create(&mut conn).map_err(|e| e.to_string())?;
        if !entry.is_present() {
            println!("RENDER extension not present");
            return Ok(());
        }
        let catalog = registry
            .ensure_format_catalog(&mut conn, &entry)
            .map_err(|e| e.to_string())?;
        print_catalog(&catalog);
        return Ok(());
    }

    let (data, width, height) = match &config.png {
        Some(path) => load_png(path)?,
        None => (solid_image(config.size, config.color), config.size, config.size),
    };
    let buffer = PixelBuffer::new(&data, width, height).with_hotspot(config.hotspot.0, config.hotspot.1);

    let cursor = try_create_cursor(registry, &mut conn, &buffer).map_err(|e| e.to_string())?;
    let root = conn
        .default_screen()
        .map(|s| s.root)
        .ok_or("Display has no screens")?;
    define_cursor(&mut conn, root, cursor).map_err(|e| e.to_string())?;
    conn.flush().map_err(|e| e.to_string())?;
    log::info!("Cursor {} installed on root window {}", cursor.id(), root.id());

    println!("Press Enter to exit");
    let mut line = String::new();
    let _ = io::stdin().lock().read_line(&mut line);

    define_cursor(&mut conn, root, Cursor::NONE).map_err(|e| e.to_string())?;
    free_cursor(&mut conn, cursor).map_err(|e| e.to_string())?;
    conn.close().map_err(|e| e.to_string())
}

fn main() {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match parse_args() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {}", err);
            eprintln!();
            print_usage();
            process::exit(1);
        }
    };

    log::debug!("{:?}", config);

    if let Err(err) = run(config) {
        eprintln!("Error: {}", err);
        process::exit(1);
    }
}
