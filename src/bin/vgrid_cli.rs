//! CLI tool for vgrid - parses delimited files and outputs JSON tables
//!
//! Usage:
//!   vgrid_cli <input.csv>                        # Output table JSON to stdout
//!   vgrid_cli <input.csv> -o out.json            # Output JSON to file
//!   vgrid_cli <input.csv> -d tab                 # Force delimiter: comma, semicolon, tab
//!   vgrid_cli <input.csv> --sort age:desc,name   # Emit rows in sorted display order
//!   vgrid_cli <input.csv> --height 600 --scroll 2400  # Emit one rendered row window
//!   vgrid_cli <input.csv> --height 600 --row 120 # Scroll table row 120 into view
//!   vgrid_cli <input.csv> --select 10-20,40-45   # Preselect data-order row ranges

#![allow(clippy::exit)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::indexing_slicing)]

use std::env;
use std::fs;
use std::io::{self, Write};
use std::str::FromStr;

use futures::executor::block_on;

use vgrid::csv::Delimiter;
use vgrid::sort::{OrderByEntry, SortDirection};
use vgrid::VGrid;

/// Heights used when `--height` requests a viewport; the CLI has no CSS
/// to measure, so these stand in for the host's row metrics.
const HEADER_HEIGHT_PX: f64 = 24.0;
const ROW_HEIGHT_PX: f64 = 24.0;

struct Options {
    input: String,
    output: Option<String>,
    delimiter: Option<String>,
    order_by: Vec<OrderByEntry>,
    /// Viewport client height; without it the whole table is emitted.
    height: Option<f64>,
    scroll: Option<f64>,
    /// 1-based table row to bring into view (the header bar is row 1).
    row: Option<u32>,
    padding: Option<u32>,
    /// Half-open data-order row ranges to preselect.
    select: Vec<(u32, u32)>,
}

fn usage() -> ! {
    eprintln!(
        "Usage: vgrid_cli <input.csv> [-o output.json] [-d comma|semicolon|tab] \
         [--sort column[:asc|desc][,column...]] [--height px] [--scroll px] [--row n] \
         [--padding rows] [--select start-end[,start-end...]]"
    );
    std::process::exit(1);
}

fn parse_sort(spec: &str) -> Vec<OrderByEntry> {
    spec.split(',')
        .map(|part| {
            let (column, direction) = match part.rsplit_once(':') {
                Some((column, "asc")) => (column, SortDirection::Ascending),
                Some((column, "desc")) => (column, SortDirection::Descending),
                Some(_) => {
                    eprintln!("Error: sort direction must be 'asc' or 'desc': {part}");
                    std::process::exit(1);
                }
                None => (part, SortDirection::Ascending),
            };
            OrderByEntry {
                column: column.to_string(),
                direction,
            }
        })
        .collect()
}

fn parse_select(spec: &str) -> Vec<(u32, u32)> {
    spec.split(',')
        .map(|part| {
            let parsed = part
                .split_once('-')
                .and_then(|(a, b)| Some((a.parse().ok()?, b.parse().ok()?)));
            match parsed {
                Some((start, end)) if start < end => (start, end),
                _ => {
                    eprintln!("Error: --select expects start-end with start < end: {part}");
                    std::process::exit(1);
                }
            }
        })
        .collect()
}

fn parse_number<T: FromStr>(flag: &str, value: &str) -> T {
    value.parse().unwrap_or_else(|_| {
        eprintln!("Error: {flag} expects a number: {value}");
        std::process::exit(1);
    })
}

fn parse_args(args: &[String]) -> Options {
    if args.len() < 2 {
        usage();
    }
    let mut options = Options {
        input: args[1].clone(),
        output: None,
        delimiter: None,
        order_by: Vec::new(),
        height: None,
        scroll: None,
        row: None,
        padding: None,
        select: Vec::new(),
    };
    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "-o" | "--output" if i + 1 < args.len() => {
                options.output = Some(args[i + 1].clone());
                i += 2;
            }
            "-d" if i + 1 < args.len() => {
                options.delimiter = Some(args[i + 1].clone());
                i += 2;
            }
            "--sort" if i + 1 < args.len() => {
                options.order_by.extend(parse_sort(&args[i + 1]));
                i += 2;
            }
            "--height" if i + 1 < args.len() => {
                options.height = Some(parse_number("--height", &args[i + 1]));
                i += 2;
            }
            "--scroll" if i + 1 < args.len() => {
                options.scroll = Some(parse_number("--scroll", &args[i + 1]));
                i += 2;
            }
            "--row" if i + 1 < args.len() => {
                options.row = Some(parse_number("--row", &args[i + 1]));
                i += 2;
            }
            "--padding" if i + 1 < args.len() => {
                options.padding = Some(parse_number("--padding", &args[i + 1]));
                i += 2;
            }
            "--select" if i + 1 < args.len() => {
                options.select = parse_select(&args[i + 1]);
                i += 2;
            }
            _ => usage(),
        }
    }
    options
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let options = parse_args(&args);

    // Read input file
    let data = match fs::read(&options.input) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Error reading {}: {}", options.input, e);
            std::process::exit(1);
        }
    };

    // Parse into a grid
    let mut grid = VGrid::new();
    let loaded = match &options.delimiter {
        Some(name) => Delimiter::from_name(name)
            .and_then(|delimiter| grid.load_delimited(&data, delimiter)),
        None => grid.load_csv(&data),
    };
    if let Err(e) = loaded {
        eprintln!("Error parsing {}: {}", options.input, e);
        std::process::exit(1);
    }

    // Apply the sort so reads below come back in display order
    if let Err(e) = block_on(grid.set_order_by(options.order_by)) {
        eprintln!("Error sorting: {e}");
        std::process::exit(1);
    }

    if !options.select.is_empty() {
        let ranges: Vec<_> = options
            .select
            .iter()
            .map(|&(start, end)| serde_json::json!({ "start": start, "end": end }))
            .collect();
        let json = serde_json::json!({ "ranges": ranges }).to_string();
        if let Err(e) = grid.set_selection(&json) {
            eprintln!("Error selecting rows: {e}");
            std::process::exit(1);
        }
    }

    // A viewport narrows the output to one rendered window
    if let Some(height) = options.height {
        if let Err(e) = grid.set_viewport(height, HEADER_HEIGHT_PX, ROW_HEIGHT_PX) {
            eprintln!("Error configuring viewport: {e}");
            std::process::exit(1);
        }
        if let Some(padding) = options.padding {
            grid.set_overscan(padding);
        }
        let positioned = grid
            .scroll_to(options.scroll.unwrap_or(0.0))
            .and_then(|()| match options.row {
                Some(row) => grid.scroll_to_row(row).map(|_| ()),
                None => Ok(()),
            });
        if let Err(e) = positioned {
            eprintln!("Error scrolling: {e}");
            std::process::exit(1);
        }
    }

    // Load whatever the window needs before the synchronous reads below
    let window = match block_on(grid.fetch_window()) {
        Ok(w) => w,
        Err(e) => {
            eprintln!("Error fetching rows: {e}");
            std::process::exit(1);
        }
    };

    let view = match grid.view() {
        Ok(v) => v,
        Err(e) => {
            eprintln!("Error reading table: {e}");
            std::process::exit(1);
        }
    };
    let (start, end) = match &window {
        Some(w) => (w.rendered_rows_start, w.rendered_rows_end),
        None => (0, view.num_rows),
    };

    let mut rows = Vec::with_capacity((end - start) as usize);
    for display_row in start..end {
        let mut row = Vec::with_capacity(view.columns.len());
        for column in &view.columns {
            match grid.cell(display_row, &column.name) {
                Ok(value) => row.push(value),
                Err(e) => {
                    eprintln!("Error reading row {display_row}: {e}");
                    std::process::exit(1);
                }
            }
        }
        rows.push(row);
    }

    // Serialize to JSON: the view state plus the windowed rows
    let report = match serde_json::to_value(&view) {
        Ok(mut report) => {
            report["rowsStart"] = serde_json::json!(start);
            report["rows"] = serde_json::json!(rows);
            report
        }
        Err(e) => {
            eprintln!("Error serializing JSON: {e}");
            std::process::exit(1);
        }
    };
    let json = match serde_json::to_string_pretty(&report) {
        Ok(j) => j,
        Err(e) => {
            eprintln!("Error serializing JSON: {e}");
            std::process::exit(1);
        }
    };

    // Output
    match options.output {
        Some(path) => {
            if let Err(e) = fs::write(&path, &json) {
                eprintln!("Error writing {}: {}", path, e);
                std::process::exit(1);
            }
            eprintln!("Written: {}", path);
        }
        None => {
            io::stdout().write_all(json.as_bytes()).unwrap();
            println!();
        }
    }
}
