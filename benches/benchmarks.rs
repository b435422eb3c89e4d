use criterion::{criterion_group, criterion_main, Criterion};
use geo::{polygon, Geometry};
use geotiles::{
    GeoTransform, Georeference, LabelSource, RasterHandle, RasterLabel, TileIndexer, VectorLabel,
};
use ndarray::{s, Array3};

const SIZE: (usize, usize) = (2048, 2048);
const TILE_SIZE: usize = 256;

fn georeference() -> Georeference {
    Georeference::new(
        GeoTransform::new(500_000., 10., 4_600_000., -10.),
        "EPSG:32633",
    )
}

fn indexer<T: geotiles::DataType>(array: Array3<T>) -> TileIndexer<T> {
    let raster = RasterHandle::from_array(array, georeference()).unwrap();
    TileIndexer::new(raster, TILE_SIZE).unwrap()
}

fn bench_tile_windows(c: &mut Criterion) {
    let indexer = indexer(Array3::<u8>::zeros((1, SIZE.1, SIZE.0)));
    c.bench_function("tile_windows", |b| {
        b.iter(|| {
            (0..indexer.len())
                .map(|index| indexer.index_to_bounds(index).unwrap())
                .count()
        })
    });
}

fn bench_raster_coverage(c: &mut Criterion) {
    let mut mask = Array3::<u8>::zeros((1, SIZE.1, SIZE.0));
    mask.slice_mut(s![0, ..1024, 512..1536]).fill(1);
    let label = RasterLabel::new(RasterHandle::from_array(mask.clone(), georeference()).unwrap());
    let indexer = indexer(mask);
    c.bench_function("raster_coverage", |b| {
        b.iter(|| {
            (0..indexer.len())
                .map(|index| {
                    let window = indexer.index_to_window(index).unwrap();
                    label
                        .read_window(indexer.raster().georeference(), &window)
                        .unwrap()
                        .iter()
                        .map(|value| *value as usize)
                        .sum::<usize>()
                })
                .sum::<usize>()
        })
    });
}

fn bench_vector_coverage(c: &mut Criterion) {
    let shape = polygon![
        (x: 502_000., y: 4_585_000.),
        (x: 512_000., y: 4_587_000.),
        (x: 510_000., y: 4_598_000.),
        (x: 503_000., y: 4_595_000.),
    ];
    let label = VectorLabel::new("EPSG:32633", [Geometry::Polygon(shape)]);
    let indexer = indexer(Array3::<u8>::zeros((1, SIZE.1, SIZE.0)));
    c.bench_function("vector_coverage", |b| {
        b.iter(|| {
            (0..indexer.len())
                .map(|index| {
                    let window = indexer.index_to_window(index).unwrap();
                    label
                        .read_window(indexer.raster().georeference(), &window)
                        .unwrap()
                        .iter()
                        .map(|value| *value as usize)
                        .sum::<usize>()
                })
                .sum::<usize>()
        })
    });
}

criterion_group!(
    benches,
    bench_tile_windows,
    bench_raster_coverage,
    bench_vector_coverage
);
criterion_main!(benches);
