use std::cell::Cell;
use std::fs;
use std::path::Path;

use fishclef_roidb::annotation_parser::AnnotationParser;
use fishclef_roidb::common::{AnnotationFormat, CachePolicy, ClassTable, DatasetConfig, DetectionGrid, RoiBox, RoiRecord,
                             SparseOverlaps};
use fishclef_roidb::data::{AnnotationDoc, ImageDims};
use fishclef_roidb::results_writer::ResultsWriter;
use fishclef_roidb::roidb_cache::{AnnotationFingerprint, CacheKey, RoidbCache};
use fishclef_roidb::{DatasetError, FishClef};


use fixtures::{write_annotation, write_devkit, FixedSizeReader, FixtureImage};

fn config_for(root: &Path) -> DatasetConfig {
    DatasetConfig::new().with_cache_dir(&root.join("cache"))
}

fn assert_invariants(record: &RoiRecord, num_classes: usize) {
    let n = record.boxes.len();
    assert_eq!(record.gt_classes.len(), n);
    assert_eq!(record.gt_overlaps.rows(), n);
    assert_eq!(record.seg_areas.len(), n);
    for i in 0..n {
        assert_eq!(record.gt_overlaps.row_sum(i), 1.0);
        assert!(record.gt_classes[i] < num_classes);
    }
    assert!(!record.flipped);
}

#[test]
fn filters_images_without_objects() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let fish = ("chromis chrysura", [10., 10., 20., 20.]);
    let root = write_devkit(tmp.path(), "train", &[
        FixtureImage::new("a", (64, 48), vec![fish]),
        FixtureImage::new("b", (64, 48), vec![]),
        FixtureImage::new("c", (64, 48), vec![fish, fish]),
        FixtureImage::new("d", (64, 48), vec![]),
        FixtureImage::new("e", (64, 48), vec![fish]),
    ]);

    let dataset = FishClef::new("train", &root, config_for(&root))?;
    assert_eq!(dataset.image_index(), ["a", "c", "e"]);
    assert_eq!(dataset.name(), "fishclef_train");
    Ok(())
}

#[test]
fn blank_lines_in_image_set_are_skipped() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let root = write_devkit(tmp.path(), "train", &[
        FixtureImage::new("a", (64, 48), vec![("other", [1., 1., 5., 5.])]),
        FixtureImage::new("b", (64, 48), vec![("other", [1., 1., 5., 5.])]),
    ]);
    fs::write(root.join("data/ImageSets/train.txt"), "  a  \n\n b\n   \n")?;

    let dataset = FishClef::new("train", &root, config_for(&root))?;
    assert_eq!(dataset.image_index(), ["a", "b"]);
    Ok(())
}

#[test]
fn gt_roidb_clamps_and_keeps_invariants() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let root = write_devkit(tmp.path(), "train", &[
        FixtureImage::new("frame_0001", (100, 80), vec![
            ("Dascyllus Aruanus", [0., 5., 150., 30.]),
            ("unknown_fish", [11., 21., 31., 41.]),
            ("zebrasoma scopas", [50., 60., 70., 95.]),
        ]),
    ]);

    let mut dataset = FishClef::new("train", &root, config_for(&root))?;
    let classes = dataset.classes().clone();
    let roidb = dataset.gt_roidb()?;
    assert_eq!(roidb.len(), 1);

    let record = &roidb[0];
    assert_invariants(record, classes.len());

    assert_eq!(record.boxes[0], RoiBox::new(0., 4., 99., 29.));
    assert_eq!(record.boxes[1], RoiBox::new(10., 20., 30., 40.));
    assert_eq!(record.boxes[2], RoiBox::new(49., 59., 69., 79.));

    assert_eq!(record.gt_classes, vec![
        classes.index_of("dascyllus aruanus"),
        classes.other_index(),
        classes.index_of("zebrasoma scopas"),
    ]);
    assert_eq!(record.seg_areas, vec![100. * 26., 21. * 21., 21. * 21.]);

    let dense = record.gt_overlaps.to_dense();
    assert_eq!(dense.shape(), &[3, classes.len()]);
    assert_eq!(dense[[1, classes.other_index()]], 1.0);
    Ok(())
}

#[test]
fn unknown_class_resolves_to_other() {
    let classes = ClassTable::fishclef();
    let doc = AnnotationDoc::from_json_str(
        r#"{"annotation": {"object": {"name": "unknown_fish", "bndbox": {"xmin": "2", "ymin": "2", "xmax": "8", "ymax": "8"}}}}"#,
        Path::new("unknown.json"),
    ).unwrap();

    let record = AnnotationParser::parse("unknown", &doc, ImageDims::new(32, 32), &classes).unwrap();
    assert_eq!(record.gt_classes, vec![classes.other_index()]);
}

#[test]
fn single_object_and_one_element_list_parse_identically() {
    let classes = ClassTable::fishclef();
    let dims = ImageDims::new(640, 480);
    let object = r#"{"name": "Amphiprion Clarkii", "bndbox": {"xmin": "12", "ymin": "30", "xmax": "700", "ymax": "90"}}"#;

    let single = AnnotationDoc::from_json_str(&format!(r#"{{"annotation": {{"object": {}}}}}"#, object),
                                              Path::new("single.json")).unwrap();
    let list = AnnotationDoc::from_json_str(&format!(r#"{{"annotation": {{"object": [{}]}}}}"#, object),
                                            Path::new("list.json")).unwrap();
    let xml = AnnotationDoc::from_xml_str(&fixtures::annotation_xml(&[("Amphiprion Clarkii", [12., 30., 700., 90.])]),
                                          Path::new("single.xml")).unwrap();

    let a = AnnotationParser::parse("img", &single, dims, &classes).unwrap();
    let b = AnnotationParser::parse("img", &list, dims, &classes).unwrap();
    let c = AnnotationParser::parse("img", &xml, dims, &classes).unwrap();
    assert_eq!(a, b);
    assert_eq!(a, c);
    assert_eq!(a.boxes[0], RoiBox::new(11., 29., 639., 89.));
}

#[test]
fn missing_field_is_malformed_annotation() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let root = write_devkit(tmp.path(), "train", &[
        FixtureImage::new("a", (64, 48), vec![("other", [1., 1., 5., 5.])]),
    ]);
    fs::write(root.join("data/Annotations/a.xml"),
              "<annotation><object><name>other</name><bndbox><xmin>1</xmin><ymin>1</ymin><xmax>5</xmax></bndbox></object></annotation>")?;

    let mut dataset = FishClef::new("train", &root, config_for(&root))?;
    match dataset.gt_roidb() {
        Err(DatasetError::MalformedAnnotation { image_id, field, .. }) => {
            assert_eq!(image_id, "a");
            assert_eq!(field, "bndbox.ymax");
        }
        other => panic!("expected MalformedAnnotation, got {:?}", other.map(|r| r.len())),
    }
    Ok(())
}

#[test]
fn missing_files_are_reported() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;

    let err = FishClef::new("train", &tmp.path().join("nowhere"), DatasetConfig::new()).err();
    assert!(matches!(err, Some(DatasetError::MissingFile { .. })));

    let root = write_devkit(tmp.path(), "train", &[
        FixtureImage::new("a", (64, 48), vec![("other", [1., 1., 5., 5.])]),
    ]);
    let err = FishClef::new("val", &root, config_for(&root)).err();
    assert!(matches!(err, Some(DatasetError::MissingFile { .. })));

    fs::write(root.join("data/ImageSets/train.txt"), "a\nghost\n")?;
    let err = FishClef::new("train", &root, config_for(&root)).err();
    match err {
        Some(DatasetError::MissingFile { path }) => assert!(path.ends_with("ghost.xml")),
        other => panic!("expected MissingFile, got {:?}", other),
    }
    Ok(())
}

#[test]
fn image_paths_follow_extension_order() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let root = write_devkit(tmp.path(), "train", &[
        FixtureImage::new("a", (8, 8), vec![("other", [1., 1., 5., 5.])]),
        FixtureImage::new("b", (8, 8), vec![("other", [1., 1., 5., 5.])]),
    ]);
    let images = root.join("data/Images");
    fs::write(images.join("a.jpg"), b"")?;
    fs::remove_file(images.join("b.png"))?;
    fs::write(images.join("b.bmp"), b"")?;

    let dataset = FishClef::new("train", &root, config_for(&root))?;
    assert_eq!(dataset.image_path_at(0)?, images.join("a.jpg"));
    assert_eq!(dataset.image_path_at(1)?, images.join("b.bmp"));
    assert!(matches!(dataset.image_path_at(2), Err(DatasetError::IndexOutOfRange { index: 2, len: 2 })));

    fs::remove_file(images.join("b.bmp"))?;
    assert!(matches!(dataset.image_path_from_index("b"), Err(DatasetError::MissingFile { .. })));

    let originals = FishClef::new("train", &root, config_for(&root).with_original_images(true))?;
    fs::write(images.join("a-orig.png"), b"")?;
    assert_eq!(originals.image_path_from_index("a")?, images.join("a-orig.png"));
    Ok(())
}

#[test]
fn cache_builds_once_per_key() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let cache = RoidbCache::new(&tmp.path().join("cache"), CachePolicy::Trust);
    let key = CacheKey::new("fishclef_train", Path::new("/data/FishCLEF"));
    let calls = Cell::new(0);

    let build = || {
        calls.set(calls.get() + 1);
        Ok(vec![RoiRecord::default()])
    };

    let first = cache.get_or_build(&key, 0, build)?;
    let second = cache.get_or_build(&key, 0, || {
        calls.set(calls.get() + 1);
        Ok(Vec::new())
    })?;

    assert_eq!(calls.get(), 1);
    assert_eq!(first, second);
    assert!(cache.artifact_path(&key).ends_with("fishclef_train_FishCLEF_gt_roidb.json"));
    Ok(())
}

#[test]
fn stale_fingerprint_triggers_rebuild() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let dir = tmp.path().join("cache");
    let base = CacheKey::new("fishclef_train", Path::new("devkit"));
    let old = base.clone().with_fingerprint(AnnotationFingerprint::default());
    let new = base.with_fingerprint(AnnotationFingerprint(vec![fishclef_roidb::data::AnnotationStamp {
        image_id: "a".into(),
        len: 10,
        digest: 1,
    }]));

    let calls = Cell::new(0);
    let count = || {
        calls.set(calls.get() + 1);
        Ok(Vec::new())
    };

    let strict = RoidbCache::new(&dir, CachePolicy::Fingerprint);
    strict.get_or_build(&old, 0, count)?;
    strict.get_or_build(&old, 0, count)?;
    assert_eq!(calls.get(), 1);
    strict.get_or_build(&new, 0, count)?;
    assert_eq!(calls.get(), 2);

    let trusting = RoidbCache::new(&dir, CachePolicy::Trust);
    trusting.get_or_build(&old, 0, count)?;
    assert_eq!(calls.get(), 2);
    Ok(())
}

#[test]
fn corrupt_artifact_is_an_error() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let cache = RoidbCache::new(tmp.path(), CachePolicy::Trust);
    let key = CacheKey::new("fishclef_train", Path::new("devkit"));
    fs::write(cache.artifact_path(&key), "not json")?;

    let result = cache.get_or_build(&key, 0, || Ok(Vec::new()));
    assert!(matches!(result, Err(DatasetError::CacheDecode { .. })));
    Ok(())
}

#[test]
fn cached_record_with_broken_offsets_is_rejected() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let cache = RoidbCache::new(tmp.path(), CachePolicy::Trust);
    let key = CacheKey::new("fishclef_train", Path::new("devkit"));

    let broken = RoiRecord {
        gt_overlaps: SparseOverlaps { num_classes: 3, indptr: vec![0, 5], indices: Vec::new(), data: Vec::new() },
        ..Default::default()
    };
    cache.get_or_build(&key, 3, || Ok(vec![broken]))?;

    let result = cache.get_or_build(&key, 3, || Ok(Vec::new()));
    match result {
        Err(DatasetError::CacheDecode { reason, .. }) => assert!(reason.starts_with("record 0")),
        other => panic!("unexpected {:?}", other.map(|r| r.len())),
    }
    Ok(())
}

#[test]
fn same_length_edit_invalidates_roidb() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let root = write_devkit(tmp.path(), "train", &[
        FixtureImage::new("a", (64, 48), vec![("other", [11., 11., 20., 20.])]),
    ]);
    let reader = FixedSizeReader(ImageDims::new(64, 48));

    let mut first = FishClef::new("train", &root, config_for(&root))?.with_image_reader(&reader);
    assert_eq!(first.gt_roidb()?[0].boxes[0].x1, 10.);

    write_annotation(&root, "a", &[("other", [31., 11., 40., 20.])]);
    let mut second = FishClef::new("train", &root, config_for(&root))?.with_image_reader(&reader);
    assert_eq!(second.gt_roidb()?[0].boxes[0].x1, 30.);
    Ok(())
}

#[test]
fn dataset_roidb_survives_reload_and_tracks_edits() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let root = write_devkit(tmp.path(), "train", &[
        FixtureImage::new("a", (64, 48), vec![("chromis chrysura", [1., 1., 10., 10.])]),
    ]);

    let reader = FixedSizeReader(ImageDims::new(64, 48));
    let mut first = FishClef::new("train", &root, config_for(&root))?.with_image_reader(&reader);
    let built = first.gt_roidb()?.to_vec();

    let mut second = FishClef::new("train", &root, config_for(&root))?.with_image_reader(&reader);
    assert_eq!(second.gt_roidb()?, built.as_slice());

    // a different byte length changes the fingerprint regardless of mtime resolution
    write_annotation(&root, "a", &[("chromis chrysura", [1., 1., 10., 10.]), ("other", [20., 20., 30., 30.])]);
    let mut third = FishClef::new("train", &root, config_for(&root))?.with_image_reader(&reader);
    assert_eq!(third.gt_roidb()?[0].num_boxes(), 2);
    Ok(())
}

#[test]
fn serialized_box_matches_source_coordinates() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let classes = ClassTable::new(&["__background__", "fish", "other"])?;
    let doc = AnnotationDoc::from_xml_str(&fixtures::annotation_xml(&[("fish", [10., 20., 30., 40.])]),
                                          Path::new("img_7.xml"))?;
    let record = AnnotationParser::parse("img_7", &doc, ImageDims::new(640, 480), &classes)?;

    let mut grid = DetectionGrid::new(classes.len(), 1);
    grid.push(1, 0, record.boxes[0], 0.9)?;

    let writer = ResultsWriter::new(&tmp.path().join("results"), "comp4", "test");
    let path = writer.write(1, "fish", &grid, &["img_7".to_string()])?;
    assert!(path.ends_with("comp4_det_test_fish.txt"));
    assert_eq!(fs::read_to_string(path)?, "img_7 0.900 10.0 20.0 30.0 40.0\n");
    Ok(())
}

#[test]
fn json_annotation_devkit() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let root = write_devkit(tmp.path(), "train", &[]);
    fs::write(root.join("data/ImageSets/train.txt"), "one\nnone\n")?;
    fs::write(root.join("data/Annotations/one.json"),
              r#"{"annotation": {"object": {"name": "other", "bndbox": {"xmin": "1", "ymin": "1", "xmax": "4", "ymax": "4"}}}}"#)?;
    fs::write(root.join("data/Annotations/none.json"), r#"{"annotation": {"filename": "none.png"}}"#)?;

    let config = config_for(&root).with_annotation_format(AnnotationFormat::Json);
    let mut dataset = FishClef::new("train", &root, config)?.with_image_reader(FixedSizeReader(ImageDims::new(16, 16)));
    assert_eq!(dataset.image_index(), ["one"]);

    fs::write(root.join("data/Images/one.png"), b"")?;
    let roidb = dataset.gt_roidb()?;
    assert_eq!(roidb[0].boxes, vec![RoiBox::new(0., 0., 3., 3.)]);
    Ok(())
}
