use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use imgpress::{
    config::CompressOptions, worker, CompressionReport, ImgpressCore, JobEvent, Operation,
    OutputFormat,
};
use std::path::{Path, PathBuf};

fn gradient(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    }))
}

fn noise(width: u32, height: u32) -> DynamicImage {
    let mut state: u32 = 0x9e37_79b9;
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |_, _| {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        let [r, g, b, _] = state.to_le_bytes();
        Rgb([r, g, b])
    }))
}

fn save(image: &DynamicImage, path: &Path) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    image.save(path).unwrap();
}

fn format_of(path: &Path) -> ImageFormat {
    image::guess_format(&std::fs::read(path).unwrap()).unwrap()
}

fn run(options: CompressOptions, operation: Operation) -> CompressionReport {
    ImgpressCore::new(options).run(&operation).unwrap()
}

#[test]
fn compress_folder_mirrors_tree_into_compressed_dir() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    save(&gradient(64, 48), &root.join("a.jpg"));
    save(&gradient(40, 40), &root.join("nested/b.png"));
    save(&gradient(32, 32), &root.join("nested/deeper/c.webp"));
    std::fs::write(root.join("readme.txt"), b"not an image").unwrap();

    let report = run(CompressOptions::new(), Operation::CompressFolder(root.to_path_buf()));

    assert_eq!(report.total_files, 3);
    assert_eq!(report.processed_files, 3);
    assert_eq!(report.failed_files, 0);
    assert_eq!(report.output_dir, root.join("compressed"));

    let out = root.join("compressed");
    assert_eq!(format_of(&out.join("a.jpg")), ImageFormat::Jpeg);
    assert_eq!(format_of(&out.join("nested/b.png")), ImageFormat::Png);
    assert_eq!(format_of(&out.join("nested/deeper/c.webp")), ImageFormat::WebP);
    assert!(!out.join("readme.txt").exists());
}

#[test]
fn rerun_does_not_ingest_previous_output() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    save(&gradient(32, 32), &root.join("one.png"));
    save(&gradient(32, 32), &root.join("two.jpg"));

    let first = run(CompressOptions::new(), Operation::CompressFolder(root.to_path_buf()));
    let second = run(CompressOptions::new(), Operation::CompressFolder(root.to_path_buf()));

    assert_eq!(first.total_files, 2);
    assert_eq!(second.total_files, 2);
    assert!(!root.join("compressed/compressed").exists());
}

#[test]
fn compress_file_keeps_format_and_fits_target() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("photo.jpeg");
    save(&gradient(120, 80), &input);

    let report = run(CompressOptions::new(), Operation::CompressFile(input.clone()));

    let output = dir.path().join("compressed/photo.jpg");
    assert_eq!(report.processed_files, 1);
    assert_eq!(report.over_target_files, 0);
    assert_eq!(format_of(&output), ImageFormat::Jpeg);
    assert!(std::fs::metadata(&output).unwrap().len() <= 20 * 1024);
}

#[test]
fn oversized_image_is_written_and_flagged() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("noisy.png");
    save(&noise(200, 200), &input);

    let options = CompressOptions::new().with_target_size_kb(1);
    let report = run(options, Operation::CompressFile(input));

    assert_eq!(report.processed_files, 1);
    assert_eq!(report.over_target_files, 1);

    let output = dir.path().join("compressed/noisy.png");
    let decoded = image::open(&output).unwrap();
    // Shrunk by the loop but never below the 0.7 floor
    assert!(decoded.width() < 200);
    assert!(decoded.width() >= 140);
}

#[test]
fn user_scale_is_applied_before_compression() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("wide.png");
    save(&gradient(100, 50), &input);

    let options = CompressOptions::new().with_scale(0.5);
    run(options, Operation::CompressFile(input));

    let decoded = image::open(dir.path().join("compressed/wide.png")).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (50, 25));
}

#[test]
fn convert_folder_changes_extensions() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    save(&gradient(30, 30), &root.join("x.jpg"));
    save(&gradient(30, 30), &root.join("sub/y.png"));
    save(&gradient(30, 30), &root.join("sub/z.bmp"));

    let report = run(
        CompressOptions::new(),
        Operation::ConvertFolder {
            input: root.to_path_buf(),
            target: OutputFormat::WebP,
        },
    );

    assert_eq!(report.processed_files, 3);
    let out = root.join("compressed");
    for name in ["x.webp", "sub/y.webp", "sub/z.webp"] {
        assert_eq!(format_of(&out.join(name)), ImageFormat::WebP, "{name}");
    }
}

#[test]
fn convert_png_with_alpha_to_jpeg() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("logo.png");
    let logo = RgbaImage::from_fn(24, 24, |x, _| {
        if x < 12 {
            Rgba([255, 255, 0, 255])
        } else {
            Rgba([0, 0, 0, 0])
        }
    });
    save(&DynamicImage::ImageRgba8(logo), &input);

    let output_dir = dir.path().join("out");
    let options = CompressOptions::new().with_output_dir(output_dir.clone());
    run(
        options,
        Operation::ConvertFile {
            input,
            target: OutputFormat::Jpeg,
        },
    );

    let output = output_dir.join("logo.jpg");
    assert_eq!(format_of(&output), ImageFormat::Jpeg);
}

#[test]
fn rename_numbers_files_in_sorted_order() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    save(&gradient(20, 20), &root.join("b.png"));
    save(&gradient(20, 20), &root.join("a.jpg"));
    save(&gradient(20, 20), &root.join("sub/c.png"));

    let report = run(
        CompressOptions::new(),
        Operation::RenameFolder {
            input: root.to_path_buf(),
            base_name: " trip ".to_string(),
        },
    );

    assert_eq!(report.processed_files, 3);
    let out = root.join("compressed");
    assert_eq!(format_of(&out.join("trip-1.jpg")), ImageFormat::Jpeg);
    assert_eq!(format_of(&out.join("trip-2.png")), ImageFormat::Png);
    assert_eq!(format_of(&out.join("sub/trip-3.png")), ImageFormat::Png);
}

#[test]
fn rename_rejects_blank_base_name() {
    let dir = tempfile::tempdir().unwrap();
    save(&gradient(8, 8), &dir.path().join("a.png"));

    let result = ImgpressCore::new(CompressOptions::new()).run(&Operation::RenameFolder {
        input: dir.path().to_path_buf(),
        base_name: "  ".to_string(),
    });
    assert!(result.is_err());
    assert!(!dir.path().join("compressed").exists());
}

#[test]
fn empty_folder_yields_empty_report() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("notes.md"), b"# nothing").unwrap();

    let report = run(CompressOptions::new(), Operation::CompressFolder(dir.path().to_path_buf()));

    assert_eq!(report.total_files, 0);
    assert_eq!(report.processed_files, 0);
    assert_eq!(report.errors.len(), 1);
}

#[test]
fn corrupt_file_does_not_stop_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    save(&gradient(16, 16), &root.join("good.png"));
    std::fs::write(root.join("broken.jpg"), [0xFF, 0xD8, 0x00, 0x01, 0x02]).unwrap();

    let report = run(CompressOptions::new(), Operation::CompressFolder(root.to_path_buf()));

    assert_eq!(report.total_files, 2);
    assert_eq!(report.processed_files, 1);
    assert_eq!(report.failed_files, 1);
    assert!(report.errors[0].contains("broken.jpg"));
    assert!(root.join("compressed/good.png").exists());
}

#[test]
fn single_file_failure_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("broken.png");
    std::fs::write(&input, [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0]).unwrap();

    let result = ImgpressCore::new(CompressOptions::new()).run(&Operation::CompressFile(input));
    assert!(result.is_err());
}

#[test]
fn pass_through_formats_are_copied() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("icon.bmp");
    save(&gradient(10, 10), &input);

    run(CompressOptions::new(), Operation::CompressFile(input.clone()));

    let output = dir.path().join("compressed/icon.bmp");
    assert_eq!(std::fs::read(&output).unwrap(), std::fs::read(&input).unwrap());
}

#[test]
fn tga_and_ico_pass_through() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    save(&gradient(10, 10), &root.join("shot.tga"));
    save(
        &DynamicImage::ImageRgba8(gradient(16, 16).to_rgba8()),
        &root.join("icons/app.ico"),
    );

    let report = run(CompressOptions::new(), Operation::CompressFile(root.join("shot.tga")));
    assert_eq!(report.processed_files, 1);
    assert_eq!(
        std::fs::read(root.join("compressed/shot.tga")).unwrap(),
        std::fs::read(root.join("shot.tga")).unwrap()
    );

    let report = run(CompressOptions::new(), Operation::CompressFolder(root.to_path_buf()));
    assert_eq!(report.total_files, 2);
    assert_eq!(report.processed_files, 2);
    assert_eq!(report.failed_files, 0);
    for name in ["shot.tga", "icons/app.ico"] {
        assert_eq!(
            std::fs::read(root.join("compressed").join(name)).unwrap(),
            std::fs::read(root.join(name)).unwrap(),
            "{name}"
        );
    }
}

#[test]
fn pass_through_is_reencoded_when_prescaled() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    save(&gradient(40, 20), &root.join("plain.bmp"));
    save(&gradient(40, 20), &root.join("shot.tga"));

    let options = CompressOptions::new().with_scale(0.5);
    let report = run(options, Operation::CompressFolder(root.to_path_buf()));
    assert_eq!(report.processed_files, 2);
    assert_eq!(report.over_target_files, 0);

    let bmp = root.join("compressed/plain.bmp");
    assert_eq!(format_of(&bmp), ImageFormat::Bmp);
    let decoded = image::open(&bmp).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (20, 10));

    let decoded = image::open(root.join("compressed/shot.tga")).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (20, 10));
}

#[test]
fn oversized_webp_is_fitted_to_the_canvas_limit() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("panorama.png");
    let strip = RgbImage::from_fn(16500, 2, |x, _| Rgb([(x % 256) as u8, 60, 120]));
    save(&DynamicImage::ImageRgb8(strip), &input);

    let options = CompressOptions::new().with_target_size_kb(512);
    let report = run(
        options,
        Operation::ConvertFile {
            input,
            target: OutputFormat::WebP,
        },
    );
    assert_eq!(report.processed_files, 1);

    let decoded = image::open(dir.path().join("compressed/panorama.webp")).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (16383, 1));
}

#[test]
fn skip_existing_and_dry_run() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    save(&gradient(16, 16), &root.join("a.png"));
    save(&gradient(16, 16), &root.join("b.png"));

    let dry = run(
        CompressOptions::new().with_dry_run(true),
        Operation::CompressFolder(root.to_path_buf()),
    );
    assert_eq!(dry.processed_files, 2);
    assert!(!root.join("compressed").exists());

    run(CompressOptions::new(), Operation::CompressFolder(root.to_path_buf()));
    let again = run(
        CompressOptions::new().with_skip_existing(true),
        Operation::CompressFolder(root.to_path_buf()),
    );
    assert_eq!(again.skipped_files, 2);
    assert_eq!(again.processed_files, 0);
}

#[test]
fn missing_input_is_an_error() {
    let result = ImgpressCore::new(CompressOptions::new())
        .run(&Operation::CompressFolder(PathBuf::from("no/such/folder")));
    assert!(result.is_err());
}

#[test]
fn background_job_streams_progress_to_completion() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    for i in 0..4 {
        save(&gradient(24, 24), &root.join(format!("img{i}.png")));
    }

    let handle = worker::spawn(
        CompressOptions::new(),
        Operation::CompressFolder(root.to_path_buf()),
    )
    .unwrap();

    let mut percents = Vec::new();
    let mut started = None;
    let report = handle
        .wait_with(|event| match event {
            JobEvent::Started { total } => started = Some(*total),
            JobEvent::Progress { percent, .. } => percents.push(*percent),
            _ => {}
        })
        .unwrap();

    assert_eq!(started, Some(4));
    assert_eq!(percents.len(), 4);
    assert!(percents.contains(&100));
    assert_eq!(report.processed_files, 4);
}

#[test]
fn stats_track_the_last_run() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    save(&gradient(16, 16), &root.join("a.png"));
    save(&gradient(16, 16), &root.join("b.jpg"));

    let mut core = ImgpressCore::new(CompressOptions::new());
    core.run(&Operation::CompressFolder(root.to_path_buf())).unwrap();

    let stats = core.get_stats();
    assert_eq!(stats.completed(), 2);
    assert_eq!(stats.get_format_stats().get("png"), Some(&1));
    assert_eq!(stats.get_format_stats().get("jpg"), Some(&1));
    assert_eq!(core.options().quality, 75);
}

#[test]
fn background_job_events_can_be_polled() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("single.png");
    save(&gradient(16, 16), &input);

    let handle = worker::spawn(CompressOptions::new(), Operation::CompressFile(input)).unwrap();
    let first = handle.events().recv().unwrap();
    assert!(matches!(first, JobEvent::Started { total: 1 }));

    let report = handle.wait().unwrap();
    assert_eq!(report.processed_files, 1);
}
