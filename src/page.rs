//! Server-rendered HTML for the browser UI.

use crate::diagnosis::Diagnosis;

pub const TITLE: &str = "Paddy Disease Finder";
pub const UNCERTAIN_HINT: &str = "Please upload a clearer image with proper lighting.";

const STYLE: &str = r#"
body { font-family: system-ui, sans-serif; max-width: 46rem; margin: 2rem auto; padding: 0 1rem; color: #1f2933; }
h1 { margin-bottom: 0.2rem; }
h2.subtitle { font-weight: 400; color: #52606d; margin-top: 0; }
hr { border: none; border-top: 1px solid #d9e2ec; margin: 1.5rem 0; }
figure { margin: 1rem 0; }
figure img, #preview { width: 100%; border-radius: 6px; }
figcaption { color: #7b8794; font-size: 0.9rem; text-align: center; }
.banner { padding: 0.8rem 1rem; border-radius: 6px; margin: 1rem 0; }
.success { background: #e3f9e5; color: #05400a; }
.warning { background: #fffbea; color: #8d2b0b; }
.error { background: #ffe3e3; color: #610316; }
ul.tips { list-style: none; padding-left: 0; }
ul.tips li::before { content: "\2714\00a0"; color: #3f9142; }
button { font-size: 1rem; padding: 0.5rem 1.2rem; margin-top: 1rem; }
footer { color: #9aa5b1; font-size: 0.85rem; }
"#;

const SCRIPT: &str = r#"
const inputs = { upload: document.getElementById('upload'), camera: document.getElementById('camera') };
const preview = document.getElementById('preview');
document.querySelectorAll('input[name=method]').forEach(radio => radio.addEventListener('change', () => {
  for (const [key, el] of Object.entries(inputs)) {
    const active = key === radio.value;
    el.disabled = !active;
    el.closest('p').hidden = !active;
  }
}));
Object.values(inputs).forEach(el => el.addEventListener('change', () => {
  const file = el.files && el.files[0];
  if (file) { preview.src = URL.createObjectURL(file); preview.hidden = false; }
}));
"#;

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn layout(body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
<style>{style}</style>
</head>
<body>
<h1>🌾 {title}</h1>
<h2 class="subtitle">Early detection &amp; treatment suggestions for paddy crops</h2>
<hr>
{body}
<hr>
<footer>{title} | ML-based Early Detection System</footer>
</body>
</html>
"#,
        title = TITLE,
        style = STYLE,
        body = body
    )
}

pub fn render_index() -> String {
    let body = format!(
        r#"<form action="/detect" method="post" enctype="multipart/form-data">
<p>Choose image input method:</p>
<label><input type="radio" name="method" value="upload" checked> Upload Image</label>
<label><input type="radio" name="method" value="camera"> Take a Picture</label>
<p><label>Upload a paddy leaf image<br>
<input id="upload" type="file" name="image" accept=".jpg,.jpeg,.png,image/jpeg,image/png" required></label></p>
<p hidden><label>Take a picture of the paddy leaf<br>
<input id="camera" type="file" name="image" accept="image/*" capture="environment" required disabled></label></p>
<figure><img id="preview" alt="Selected Paddy Leaf Image" hidden><figcaption>Selected Paddy Leaf Image</figcaption></figure>
<button type="submit">🔍 Detect Disease</button>
</form>
<script>{script}</script>"#,
        script = SCRIPT
    );
    layout(&body)
}

pub struct ResultView<'a> {
    pub image_uri: &'a str,
    pub diagnosis: &'a Diagnosis,
    pub gradcam_uri: Option<&'a str>,
    pub tips: &'a [String],
}

pub fn render_result(view: &ResultView<'_>) -> String {
    let mut body = format!(
        r#"<figure><img src="{}" alt="Selected Paddy Leaf Image"><figcaption>Selected Paddy Leaf Image</figcaption></figure>
<hr>
"#,
        view.image_uri
    );

    match (&view.diagnosis.prediction, view.diagnosis.is_confident()) {
        (Some(disease), true) => {
            body.push_str(&format!(
                "<div class=\"banner success\">🦠 Disease Detected: <strong>{}</strong> ({:.1}% confidence)</div>\n",
                escape(disease),
                view.diagnosis.confidence * 100.0
            ));
            if let Some(uri) = view.gradcam_uri {
                body.push_str(&format!(
                    r#"<h3>🔎 Affected Area</h3>
<figure><img src="{}" alt="Affected area heat map"><figcaption>Regions whose occlusion lowers the model's confidence most</figcaption></figure>
"#,
                    uri
                ));
            }
            body.push_str("<h3>🌱 Treatment &amp; Improvement Suggestions</h3>\n");
            if view.tips.is_empty() {
                body.push_str("<p>No treatment suggestions are available for this disease.</p>\n");
            } else {
                let items: String = view.tips.iter().map(|tip| format!("<li>{}</li>\n", escape(tip))).collect();
                body.push_str(&format!("<ul class=\"tips\">\n{}</ul>\n", items));
            }
        }
        _ => {
            body.push_str("<div class=\"banner warning\">⚠️ Prediction Uncertain</div>\n");
            body.push_str(&format!("<p>{}</p>\n", UNCERTAIN_HINT));
        }
    }

    body.push_str("<p><a href=\"/\">Check another leaf</a></p>\n");
    layout(&body)
}

pub fn render_error(status: u16, message: &str) -> String {
    layout(&format!(
        r#"<div class="banner error">Error {}: {}</div>
<p><a href="/">Back</a></p>"#,
        status,
        escape(message)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnosis::{Diagnosis, Status};

    fn confident(label: &str) -> Diagnosis {
        Diagnosis {
            status: Status::Confident,
            prediction: Some(label.to_string()),
            class_index: Some(0),
            confidence: 0.912,
            scores: Vec::new(),
            gradcam: None,
        }
    }

    #[test]
    fn escape_html_specials() {
        assert_eq!(escape(r#"<a href="x">&'"#), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
    }

    #[test]
    fn index_offers_upload_and_camera() {
        let html = render_index();
        assert!(html.contains("Upload Image"));
        assert!(html.contains("Take a Picture"));
        assert!(html.contains(r#"capture="environment""#));
        assert!(html.contains(r#"action="/detect""#));
    }

    #[test]
    fn confident_page_lists_tips_and_overlay() {
        let tips = vec!["Use disease-free seeds".to_string(), "Drain <fields>".to_string()];
        let diagnosis = confident("BacterialBlight");
        let html = render_result(&ResultView {
            image_uri: "data:image/png;base64,AAAA",
            diagnosis: &diagnosis,
            gradcam_uri: Some("data:image/png;base64,BBBB"),
            tips: &tips,
        });

        assert!(html.contains("Disease Detected: <strong>BacterialBlight</strong> (91.2% confidence)"));
        assert!(html.contains("Affected Area"));
        assert!(html.contains("<li>Use disease-free seeds</li>"));
        assert!(html.contains("Drain &lt;fields&gt;"));
        assert!(!html.contains("Prediction Uncertain"));
    }

    #[test]
    fn confident_page_without_tips_or_overlay() {
        let diagnosis = confident("Blast");
        let html = render_result(&ResultView {
            image_uri: "data:image/png;base64,AAAA",
            diagnosis: &diagnosis,
            gradcam_uri: None,
            tips: &[],
        });

        assert!(html.contains("Disease Detected: <strong>Blast</strong>"));
        assert!(html.contains("No treatment suggestions are available"));
        assert!(!html.contains("<ul"));
        assert!(!html.contains("Affected Area"));
        assert!(html.contains("Check another leaf"));
    }

    #[test]
    fn uncertain_page_shows_warning_only() {
        let diagnosis = Diagnosis::uncertain(0.41);
        let html = render_result(&ResultView {
            image_uri: "data:image/png;base64,AAAA",
            diagnosis: &diagnosis,
            gradcam_uri: None,
            tips: &[],
        });

        assert!(html.contains("Prediction Uncertain"));
        assert!(html.contains(UNCERTAIN_HINT));
        assert!(!html.contains("Disease Detected"));
        assert!(!html.contains("Treatment"));
    }
}
