use ccplot::core::dimmap::{dimmap, dimmap_geolocation, DimensionMap};
use ndarray::{array, Array2, Axis};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn test_longitude_tie_points_cross_antimeridian() {
    init_logging();

    let lon = array![350.0f32, 5.0, 20.0, 10.0, 350.0];
    let out = dimmap(&lon, 30, DimensionMap::new(4, 5), Axis(0), Some(360.0))
        .expect("Failed to map longitudes");

    println!("Mapped longitudes: {:?}", out.to_vec());

    assert_eq!(out.len(), 30);
    assert!((out[0] - 338.0).abs() < 1e-3, "index 0 was {}", out[0]);
    assert!((out[7] - 359.0).abs() < 1e-3);
    assert!((out[8] - 2.0).abs() < 1e-3);

    // no sample wanders to the far side of the globe
    for (i, v) in out.iter().enumerate() {
        assert!(*v >= 0.0 && *v < 360.0, "index {} out of range: {}", i, v);
        assert!((*v - 180.0).abs() > 120.0, "index {} took the long way: {}", i, v);
    }
}

#[test]
fn test_geolocation_window_alignment() {
    init_logging();

    // 1 km data with 5 km tie points at columns/rows 2, 7, 12, ...
    let lon: Array2<f32> = Array2::from_shape_fn((3, 3), |(_, j)| 10.0 + 5.0 * j as f32);
    let lat: Array2<f32> = Array2::from_shape_fn((3, 3), |(i, _)| -10.0 + 5.0 * i as f32);
    let map = DimensionMap::new(2, 5);

    let full = dimmap_geolocation(&lon, &lat, (15, map), (15, map)).expect("Failed to map full swath");
    let window = dimmap_geolocation(&lon, &lat, (5, map.starting_at(4)), (5, map.starting_at(6)))
        .expect("Failed to map swath window");

    for i in 0..5 {
        for j in 0..5 {
            assert!((window.lon[[i, j]] - full.lon[[i + 4, j + 6]]).abs() < 1e-4);
            assert!((window.lat[[i, j]] - full.lat[[i + 4, j + 6]]).abs() < 1e-4);
        }
    }

    // tie point columns reproduce the coarse values, negative latitudes survive
    assert!((full.lon[[0, 7]] - 15.0).abs() < 1e-4);
    assert!((full.lat[[2, 0]] + 10.0).abs() < 1e-4);
    assert!(full.lat[[12, 0]].abs() < 1e-4);
}
