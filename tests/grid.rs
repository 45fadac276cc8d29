use reclip::filtergraph::grid_overlay;
use reclip::grid::{layout, rows_columns, GridSpec, LayoutError, MAX_ITEMS};

fn coords(count: usize, width: u32, height: u32) -> Vec<(u32, u32)> {
    layout(count, width, height).unwrap().iter().map(|p| (p.x, p.y)).collect()
}

#[test]
fn test_documented_layouts() {
    assert_eq!(rows_columns(4), Ok((2, 2)));
    assert_eq!(rows_columns(7), Ok((3, 3)));
    assert_eq!(rows_columns(10), Err(LayoutError::UnsupportedItemCount(10)));
    assert_eq!(rows_columns(0), Err(LayoutError::UnsupportedItemCount(0)));

    assert_eq!(coords(4, 400, 800), vec![(0, 0), (200, 0), (0, 400), (200, 400)]);
    assert_eq!(coords(3, 400, 800), vec![(0, 0), (200, 0), (100, 400)]);
}

#[test]
fn test_every_count_stays_on_canvas() {
    let (width, height) = (1080, 1920);
    for count in 1..=MAX_ITEMS {
        let spec = GridSpec::new(count, width, height).unwrap();
        let (cell_width, cell_height) = spec.cell_size();
        let placements = spec.placements();

        assert_eq!(placements.len(), count);
        for (i, p) in placements.iter().enumerate() {
            assert_eq!(p.index, i);
            assert!(p.x < width && p.y < height, "{} items: {:?}", count, p);
            assert!(p.x + cell_width <= width);
            assert!(p.y + cell_height <= height);
        }
    }
}

#[test]
fn test_partial_last_row_is_centered() {
    // 8 items on 3x3: one empty slot shifts the last row by half a cell.
    let placements = coords(8, 900, 900);
    assert_eq!(&placements[6..], &[(150, 600), (450, 600)]);

    // 5 items on 2x3
    let placements = coords(5, 900, 600);
    assert_eq!(&placements[3..], &[(150, 300), (450, 300)]);
}

#[test]
fn test_grid_overlay_uses_layout() {
    let graph = grid_overlay(&[(400, 400), (400, 200), (100, 400)], 400, 800).unwrap();
    // Cells are 200x400; squares fit as 200x200 centered vertically.
    assert!(graph.contains("[1:v]scale=200:200,setsar=1[i0];[bg][i0]overlay=x=0:y=100[o0];"));
    assert!(graph.contains("[2:v]scale=200:100,setsar=1[i1];[o0][i1]overlay=x=200:y=150[o1];"));
    assert!(graph.ends_with("[3:v]scale=100:400,setsar=1[i2];[o1][i2]overlay=x=150:y=400[out]"));

    assert!(matches!(grid_overlay(&[], 400, 800), Err(LayoutError::UnsupportedItemCount(0))));
    assert!(matches!(
        grid_overlay(&[(10, 10)], 0, 800),
        Err(LayoutError::InvalidCanvas { width: 0, height: 800 })
    ));
}
