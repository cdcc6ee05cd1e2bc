mod common;

use poster_studio::layout::{PT_PER_MM, TemplateText};
use poster_studio::model::{ExportRequest, PageSize, PostStatus};
use poster_studio::pdf::{
    DocumentMeta, ElementKind, PosterAssets, RenderStrategy, decode_image, load_image_file,
    render_poster,
};
use poster_studio::validator::{LayoutProbe, TemplateProbe};
use poster_studio::wire::ExportSubmission;

fn parametric(page: PageSize, assets: &PosterAssets) -> poster_studio::pdf::RenderedPoster {
    render_poster(
        ExportRequest {
            parameters: common::montseny_params(page),
            captured_image: None,
        },
        assets,
        &TemplateText::default(),
        DocumentMeta::default(),
    )
    .unwrap()
}

fn qr_assets() -> PosterAssets {
    PosterAssets {
        qr_target: Some("https://www.gem-malgrat.cat/?p=42".into()),
        ..PosterAssets::default()
    }
}

#[test]
fn preview_and_document_agree_on_geometry() {
    let _ = env_logger::try_init();
    let template = TemplateText::default();
    println!();
    println!("{:<6} {:<14} {:>10} {:>10}", "Page", "Element", "Preview", "Document");

    for page in [PageSize::A4, PageSize::A3] {
        let params = common::montseny_params(page);
        let preview = TemplateProbe::new(&params, &template).layout();
        let rendered = parametric(page, &qr_assets());
        let report = &rendered.report;

        let separator = report.element(ElementKind::Separator).unwrap();
        let left_width = separator.center_x() - 7.5 - preview.left_column.x;
        let right_width = report.element(ElementKind::Info).unwrap().width;
        println!(
            "{:<6} {:<14} {:>10.2} {:>10.2}",
            page.as_str(),
            "left column",
            preview.left_column.width,
            left_width
        );
        common::assert_close(left_width, preview.left_column.width, 1e-3, "left column width");
        common::assert_close(right_width, preview.right_column.width, 1e-3, "right column width");

        let qr = report.element(ElementKind::Qr).unwrap();
        println!(
            "{:<6} {:<14} {:>10.2} {:>10.2}",
            page.as_str(),
            "qr y",
            preview.qr.y,
            qr.y
        );
        assert_eq!(qr, preview.qr);
        assert_eq!(report.element(ElementKind::Title), Some(preview.title.rect));

        // What was actually painted, read back from the content stream.
        let page_h = page.height_mm();
        let ops = common::numeric_ops(&common::inflated_streams(&rendered.bytes));

        let (line_start, _) = ops
            .iter()
            .find(|(v, op)| op == "m" && v.len() == 2)
            .unwrap_or_else(|| panic!("{}: no separator path", page.as_str()));
        let sep = preview.separator;
        common::assert_close(line_start[0], sep.center_x() * PT_PER_MM, 0.01, "separator x");
        common::assert_close(line_start[1], (page_h - sep.y) * PT_PER_MM, 0.01, "separator top");

        // The QR starts with its white background square.
        let qr_box = ops
            .windows(2)
            .find(|w| w[0].1 == "g" && w[0].0 == [1.0] && w[1].1 == "re")
            .map(|w| w[1].0.clone())
            .unwrap_or_else(|| panic!("{}: no QR background", page.as_str()));
        println!(
            "{:<6} {:<14} {:>10.2} {:>10.2}",
            page.as_str(),
            "qr origin pt",
            (page_h - preview.qr.bottom()) * PT_PER_MM,
            qr_box[1]
        );
        common::assert_close(qr_box[0], preview.qr.x * PT_PER_MM, 0.01, "qr x");
        common::assert_close(qr_box[1], (page_h - preview.qr.bottom()) * PT_PER_MM, 0.01, "qr y");
        common::assert_close(qr_box[2], preview.qr.width * PT_PER_MM, 0.01, "qr width");
        common::assert_close(qr_box[3], preview.qr.height * PT_PER_MM, 0.01, "qr height");
    }
}

#[test]
fn column_split_is_sixty_forty() {
    let params = common::montseny_params(PageSize::A4);
    let layout = TemplateProbe::new(&params, &TemplateText::default()).layout();
    let usable = 210.0 - 2.0 * 25.0 - 15.0;
    common::assert_close(layout.left_column.width, usable * 0.6, 1e-3, "left");
    common::assert_close(layout.right_column.width, usable * 0.4, 1e-3, "right");
}

#[test]
fn parametric_exports_are_repeatable() {
    let assets = qr_assets();
    let first = parametric(PageSize::A4, &assets);
    let second = parametric(PageSize::A4, &assets);
    assert_eq!(first.report, second.report);
    assert_eq!(
        common::inflated_streams(&first.bytes),
        common::inflated_streams(&second.bytes)
    );
}

#[test]
fn captured_page_fills_the_whole_page() {
    let out = common::output_dir("fidelity_capture");
    // A4 at 3x natural CSS pixels
    let capture = decode_image(common::jpeg_bytes(2381, 3368, [200, 210, 220])).unwrap();
    let rendered = render_poster(
        ExportRequest {
            parameters: common::montseny_params(PageSize::A4),
            captured_image: Some(capture),
        },
        &qr_assets(),
        &TemplateText::default(),
        DocumentMeta::default(),
    )
    .unwrap();
    std::fs::write(out.join("captured.pdf"), &rendered.bytes).unwrap();

    assert_eq!(rendered.report.strategy, RenderStrategy::Captured);
    assert!(!rendered.report.qr_drawn);
    let full = rendered.report.element(ElementKind::FullPageImage).unwrap();
    assert_eq!((full.x, full.y, full.width, full.height), (0.0, 0.0, 210.0, 297.0));
    assert_eq!(rendered.report.elements.len(), 1);

    let (w, h) = common::pdf_mediabox(&rendered.bytes).unwrap();
    common::assert_close(w, 210.0 * PT_PER_MM, 0.5, "width");
    common::assert_close(h, 297.0 * PT_PER_MM, 0.5, "height");
    assert_eq!(common::image_xobject_count(&rendered.bytes), 1);
}

#[test]
fn montseny_a4_end_to_end() {
    let env = common::TestEnv::new("fidelity_montseny_a4");
    env.add_content(common::montseny_content(PostStatus::Publish));
    let service = env.editor_service();

    let response = service.handle(&ExportSubmission {
        post_id: common::POST_ID.into(),
        auth_token: common::TOKEN.into(),
        parameters: common::montseny_params(PageSize::A4),
        image_data: None,
    });
    assert!(response.success, "{:?}", response.message);

    let stored = env.stored_pdfs();
    assert_eq!(stored.len(), 1);
    let pdf = common::read(&stored[0]);
    assert_eq!(common::page_count(&pdf), 1);
    let (w, h) = common::pdf_mediabox(&pdf).unwrap();
    common::assert_close(w, 595.28, 0.5, "A4 width");
    common::assert_close(h, 841.89, 0.5, "A4 height");

    let streams = common::inflated_streams(&pdf);
    assert!(common::contains_text(&streams, "SORTIDA AL MONTSENY"));
    assert!(common::contains_text(&streams, "Lloc: Montseny"));
    assert!(common::contains_text(&streams, "Dificultat: Mitjana"));

    // Same poster through the renderer directly, with the same assets.
    let content = common::montseny_content(PostStatus::Publish);
    let mut assets = service.load_assets(&content);
    assets.featured_image = Some(
        load_image_file(&env.config.content_dir.join("featured-42.jpg")).unwrap(),
    );
    let report = parametric(PageSize::A4, &assets).report;
    assert_eq!(report.title_lines, vec!["SORTIDA AL MONTSENY".to_string()]);
    let title = report.element(ElementKind::Title).unwrap();
    common::assert_close(title.center_x(), 105.0, 1e-3, "title centre");
    assert!(report.qr_drawn);
    assert!(report.logo_drawn);
    let details = report.element(ElementKind::Details).unwrap();
    let line_h = 14.0 * 1.25 * 25.4 / 72.0;
    common::assert_close(details.height, 2.0 * line_h, 1e-3, "two detail lines");
}

#[test]
fn montseny_a3_scales_branding() {
    let env = common::TestEnv::new("fidelity_montseny_a3");
    let service = env.editor_service();
    let content = common::montseny_content(PostStatus::Publish);
    let assets = service.load_assets(&content);

    let rendered = parametric(PageSize::A3, &assets);
    std::fs::write(env.root.join("a3.pdf"), &rendered.bytes).unwrap();
    let report = rendered.report;

    assert_eq!(report.page_mm, (297.0, 420.0));
    let qr = report.element(ElementKind::Qr).unwrap();
    assert_eq!((qr.width, qr.height), (35.0, 35.0));
    let logo = report.element(ElementKind::Logo).unwrap();
    assert_eq!(logo.width, 30.0);

    let (w, h) = common::pdf_mediabox(&rendered.bytes).unwrap();
    common::assert_close(w, 297.0 * PT_PER_MM, 0.5, "A3 width");
    common::assert_close(h, 420.0 * PT_PER_MM, 0.5, "A3 height");
}

#[test]
fn probe_matches_default_poster_bottom() {
    let params = common::montseny_params(PageSize::A4);
    let template = TemplateText::default();
    let probe = TemplateProbe::new(&params, &template);
    assert!(probe.content_bottom_px() <= probe.canvas_height_px());
}
