use crate::{
    notification::Notification,
    render::{DetectionStatistics, RenderedResult},
    upload::{UploadPhase, UploadSnapshot},
};
use maud::{html, Markup, PreEscaped, DOCTYPE};

const STYLE: &str = r#"
body { background: #111827; color: #fff; font-family: sans-serif; margin: 0; padding: 24px; }
h1 { text-align: center; }
.intro { text-align: center; max-width: 56rem; margin: 0 auto 2rem; }
.accent { color: #60a5fa; }
.panels { display: flex; flex-wrap: wrap; gap: 16px; }
.panel { flex: 1 1 28rem; background: #1f2937; border-radius: 8px; padding: 16px; }
.frame { border: 1px solid #374151; border-radius: 8px; min-height: 16rem; display: flex;
         align-items: center; justify-content: center; }
.frame img { max-width: 100%; max-height: 24rem; object-fit: contain; }
.dropzone { cursor: pointer; border-style: dashed; }
.dropzone.dragging { border-color: #60a5fa; background: #1e3a8a; }
.actions { display: flex; gap: 8px; margin-top: 16px; }
.actions form { flex: 1; }
button { width: 100%; height: 2.5rem; border: none; border-radius: 4px; color: #fff;
         background: #374151; cursor: pointer; }
button.primary { background: #2563eb; }
button:disabled { opacity: .5; cursor: not-allowed; }
.toasts { max-width: 32rem; margin: 0 auto 16px; }
.toast { border-radius: 6px; padding: 8px 12px; margin-bottom: 8px; background: #fff; color: #111;
         white-space: pre-line; }
.toast.success { border-left: 6px solid #52c41a; }
.toast.info { border-left: 6px solid #1890ff; }
.toast.warning { border-left: 6px solid #faad14; }
.toast.error { border-left: 6px solid #ff4d4f; }
.toast.loading { border-left: 6px solid #1890ff; font-style: italic; }
table { width: 100%; border-collapse: collapse; margin-top: 8px; }
th, td { text-align: left; padding: 4px 8px; border-bottom: 1px solid #374151; }
td.label { color: #60a5fa; }
.muted { color: #9ca3af; }
"#;

// A picked or dropped file is posted to /select straight away. Without
// scripts the form falls back to its Select button.
const UPLOAD_SCRIPT: &str = r#"
(() => {
  const form = document.getElementById("upload-form");
  const input = document.getElementById("image-input");
  const zone = document.getElementById("dropzone");
  if (!form || !input || !zone) return;
  const send = () => { if (!input.disabled && input.files.length > 0) form.submit(); };
  input.addEventListener("change", send);
  zone.addEventListener("click", () => { if (!input.disabled) input.click(); });
  ["dragenter", "dragover"].forEach((type) => zone.addEventListener(type, (event) => {
    event.preventDefault();
    zone.classList.add("dragging");
  }));
  ["dragleave", "drop"].forEach((type) => zone.addEventListener(type, (event) => {
    event.preventDefault();
    zone.classList.remove("dragging");
  }));
  zone.addEventListener("drop", (event) => {
    const files = event.dataTransfer && event.dataTransfer.files;
    if (!files || files.length === 0 || input.disabled) return;
    const picked = new DataTransfer();
    picked.items.add(files[0]);
    input.files = picked.files;
    send();
  });
})();
"#;

/// Renders the whole single-page view.
pub fn render_page(snapshot: &UploadSnapshot, notifications: &[Notification]) -> String {
    let markup = html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                title { "YOLO Object Detector" }
                style { (PreEscaped(STYLE)) }
            }
            body {
                h1 { "YOLO Object Detector" }
                p class="intro" {
                    "Upload an image and let the model do the rest. It locates the objects in "
                    "the image and classifies them into one of the "
                    span class="accent" { "80 COCO classes" } "."
                }
                (toasts(snapshot, notifications))
                div class="panels" {
                    (upload_panel(snapshot))
                    (result_panel(snapshot))
                }
                script { (PreEscaped(UPLOAD_SCRIPT)) }
            }
        }
    };
    markup.into_string()
}

fn toasts(snapshot: &UploadSnapshot, notifications: &[Notification]) -> Markup {
    html! {
        @if !notifications.is_empty() || snapshot.loading.is_some() {
            div class="toasts" {
                @if let Some(loading) = &snapshot.loading {
                    div class="toast loading" {
                        strong { (loading.title) }
                        br;
                        (loading.description)
                    }
                }
                @for notification in notifications {
                    div class=(format!("toast {}", notification.kind.as_str())) {
                        strong { (notification.title) }
                        br;
                        (notification.description)
                    }
                }
            }
        }
    }
}

fn upload_panel(snapshot: &UploadSnapshot) -> Markup {
    let busy = snapshot.phase == UploadPhase::Submitting;
    html! {
        div class="panel" {
            div { "source_img" }
            form id="upload-form" class="upload" action="/select" method="post"
                enctype="multipart/form-data" {
                div id="dropzone" class="frame dropzone" {
                    @match &snapshot.candidate {
                        Some(candidate) => {
                            img src=(candidate.preview_url) alt="Source";
                        }
                        None => {
                            p {
                                "Drop Image Here" br;
                                span class="muted" { "- or -" } br;
                                "Click to Upload"
                            }
                        }
                    }
                }
                input id="image-input" type="file" name="image" accept="image/*" disabled[busy];
                noscript {
                    button type="submit" disabled[busy] { "Select" }
                }
            }
            @if let Some(candidate) = &snapshot.candidate {
                p class="muted" {
                    (candidate.file_name) " (" (candidate.mime_type) ", "
                    (candidate.size_bytes) " bytes)"
                }
            }
            div class="actions" {
                form action="/clear" method="post" {
                    button type="submit" disabled[busy] { "Clear" }
                }
                form action="/submit" method="post" {
                    button class="primary" type="submit" disabled[!snapshot.can_submit()] {
                        @if busy { "Processing..." } @else { "Submit" }
                    }
                }
            }
        }
    }
}

fn result_panel(snapshot: &UploadSnapshot) -> Markup {
    html! {
        div class="panel" {
            div { "Image with detected objects" }
            div class="frame" {
                @match (&snapshot.loading, &snapshot.result) {
                    (Some(_), _) => {
                        p class="muted" { "Processing..." }
                    }
                    (None, Some(result)) => {
                        img src=(result.image_src) alt="Result";
                    }
                    (None, None) => {
                        p class="muted" { "No result yet" }
                    }
                }
            }
            @if let Some(result) = &snapshot.result {
                (statistics_table(&result.statistics))
                (detections_table(result))
            }
        }
    }
}

fn statistics_table(statistics: &DetectionStatistics) -> Markup {
    html! {
        div class="stats" {
            h3 { "Detection Results" }
            @if statistics.is_empty() {
                p class="zero" { "0 objects detected" }
            } @else {
                p { "Total objects detected: " (statistics.total) }
                h4 { "Objects by category:" }
                table {
                    tr { th { "Label" } th { "Count" } th { "Average confidence" } }
                    @for label in &statistics.labels {
                        tr {
                            td class="label" { (label.label) }
                            td { (label.count) }
                            td { (percent(label.average_confidence)) }
                        }
                    }
                }
            }
        }
    }
}

fn detections_table(result: &RenderedResult) -> Markup {
    html! {
        @if !result.detections.is_empty() {
            h4 { "Detections" }
            table {
                tr { th { "Label" } th { "Confidence" } th { "Box (x, y, w, h)" } }
                @for detection in &result.detections {
                    @let b = &detection.bounding_box;
                    tr {
                        td class="label" { (detection.label) }
                        td { (percent(detection.confidence)) }
                        td { (format!("{:.0}, {:.0}, {:.0}, {:.0}", b.x, b.y, b.width, b.height)) }
                    }
                }
            }
        }
    }
}

fn percent(value: f32) -> String {
    format!("{:.1}%", value * 100.0)
}
