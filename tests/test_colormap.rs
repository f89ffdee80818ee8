use ccplot::io::colormap::{ColorScale, Colormap, ColormapLoader};
use ccplot::PlotError;
use std::fs;

fn write_cmap(dir: &std::path::Path, name: &str, text: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, text).expect("Failed to write colormap");
    path
}

#[test]
fn test_boundary_norm_contract() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");

    // 3 bound lines expand to 3 + 4 + 2 = 9 bounds
    let bounds = "BOUNDS\n-30 0 10\n0 20 5\n20 21 0.5\n";
    let colors: String = (0..8).map(|i| format!("{} {} {}\n", i * 30, 0, 255 - i * 30)).collect();
    let text = format!("{}COLORS\n{}UNDER_OVER_BAD_COLORS\n0 0 0\n255 255 255\n128 128 128 0\n", bounds, colors);
    let path = write_cmap(dir.path(), "eight.cmap", &text);

    let cmap = Colormap::from_file(&path).expect("Failed to load colormap");
    println!("Loaded {} bounds and {} colors", cmap.bounds.len(), cmap.colors.len());
    assert_eq!(cmap.bounds.len(), 9);
    assert_eq!(cmap.colors.len(), 8);
    assert!(cmap.has_boundary_norm());
    assert!(matches!(cmap.scale(), ColorScale::Boundaries { .. }));
    assert_eq!(cmap.bad, [128, 128, 128, 0]);

    // one color too many breaks the pairing
    let text = format!("{}COLORS\n{}0 0 0\n", bounds, colors);
    let cmap = Colormap::parse(&text, "nine").expect("Failed to parse colormap");
    assert!(!cmap.has_boundary_norm());
    assert!(matches!(cmap.scale(), ColorScale::Listed { .. }));
    assert_eq!(cmap.color_for(1.0), None);
}

#[test]
fn test_malformed_line_number() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = write_cmap(dir.path(), "broken.cmap", "BOUNDS\n0 10 1\nCOLORS\n0 0 0\n255 0\n");

    match Colormap::from_file(&path) {
        Err(PlotError::MalformedColormap { line, source_name, .. }) => {
            assert_eq!(line, 5);
            assert!(source_name.ends_with("broken.cmap"));
        }
        other => panic!("Expected malformed colormap error, got {:?}", other),
    }
}

#[test]
fn test_loader_search_path() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    write_cmap(dir.path(), "calipso-backscatter.cmap", "COLORS\n1 2 3\n");

    let loader = ColormapLoader::with_search_path(vec![dir.path().join("missing"), dir.path().to_path_buf()]);
    let cmap = loader.load("calipso-backscatter").expect("Failed to load by name");
    assert_eq!(cmap.colors, vec![[1, 2, 3, 255]]);

    assert!(loader.load("calipso-backscatter.cmap").is_ok());
    assert!(matches!(loader.load("nonexistent"), Err(PlotError::Io(_))));
}
