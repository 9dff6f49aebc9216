//! Generated carousel content and the batch of images rendered from it.

use image::DynamicImage;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

use crate::compositor::{Compositor, TextFace};
use crate::error::{CarouselError, Result};
use crate::export::Artifact;
use crate::image_handler::{self, ImageSource};
use crate::store::MockupImage;
use crate::utils::filename;

/// Themes offered for generation.
pub const THEMES: &[&str] = &[
    "Attacchi di Panico",
    "Overthinking (Pensiero Eccessivo)",
    "Ruminazione Mentale",
    "People-Pleasing",
    "Esaurimento Emotivo",
    "Sovraccarico Sensoriale",
    "Paure Inconsce",
    "Ansia Somatica",
    "Perfezionismo",
    "Paura del Giudizio",
    "Ansia Mattutina",
    "Spirali Notturne",
    "Confini Emotivi",
    "Dialogo Interiore Critico",
    "Risposte da Trauma",
    "Sensibilità del Bambino Interiore",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slide {
    /// Display number only; slides are kept in the order received.
    pub slide_number: u32,
    pub text: String,
    #[serde(default)]
    pub image_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// One generation result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarouselData {
    pub title: String,
    pub description: String,
    pub slides: Vec<Slide>,
    pub final_slide_sentence: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_slide_image_url: Option<String>,
}

impl CarouselData {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Number shown on the closing slide: the last slide's number, or the
    /// next one when there are no slides.
    pub fn final_slide_number(&self) -> u32 {
        self.slides
            .last()
            .map(|s| s.slide_number)
            .unwrap_or(self.slides.len() as u32 + 1)
    }
}

/// Produces carousel content for a theme. Errors are passed through to the
/// caller untouched; nothing is retried.
pub trait ContentGenerator {
    fn generate(&self, theme: &str) -> anyhow::Result<CarouselData>;
}

/// Copy of `data` whose closing slide uses a randomly chosen mockup.
/// Without mockups the data is returned unchanged.
pub fn with_random_mockup<R: Rng>(
    data: &CarouselData,
    mockups: &[MockupImage],
    rng: &mut R,
) -> CarouselData {
    if mockups.is_empty() {
        return data.clone();
    }
    let chosen = &mockups[rng.random_range(0..mockups.len())];
    CarouselData {
        final_slide_image_url: Some(chosen.data_url.clone()),
        ..data.clone()
    }
}

/// Generate content for `theme` and attach a mockup when any are stored.
pub fn generate_with_mockup<G, R>(
    generator: &G,
    theme: &str,
    mockups: &[MockupImage],
    rng: &mut R,
) -> anyhow::Result<CarouselData>
where
    G: ContentGenerator + ?Sized,
    R: Rng,
{
    let data = generator.generate(theme)?;
    Ok(with_random_mockup(&data, mockups, rng))
}

/// Outcome of rendering one image of a carousel.
#[derive(Debug)]
pub struct RenderOutcome {
    pub suffix: String,
    pub result: Result<Artifact>,
}

/// Render every downloadable image of `data`, one after another.
///
/// For each slide with an image this yields the plain background
/// (`slide-<n>-sfondo`) and the captioned composite (`slide-<n>-completa`);
/// a closing image yields `slide-<n>-libro` captioned with the final
/// sentence. A failure only affects its own outcome.
pub fn render_carousel<F: TextFace>(
    compositor: &Compositor<F>,
    data: &CarouselData,
    timeout: Duration,
) -> Vec<RenderOutcome> {
    let mut outcomes = Vec::new();

    for slide in &data.slides {
        let Some(url) = slide.image_url.as_deref() else {
            continue;
        };

        let sfondo = format!("slide-{}-sfondo", slide.slide_number);
        let completa = format!("slide-{}-completa", slide.slide_number);

        // One decode serves both the plain background and the composite.
        match image_handler::load_image(ImageSource::parse(url), timeout) {
            Ok(background) => {
                let result = background_artifact(&background, &data.title, &sfondo);
                outcomes.push(RenderOutcome {
                    suffix: sfondo,
                    result,
                });
                let result =
                    compositor.render_image(&background, &slide.text, &data.title, &completa);
                outcomes.push(RenderOutcome {
                    suffix: completa,
                    result,
                });
            }
            Err(e) => {
                let repeated = CarouselError::ImageLoad(match &e {
                    CarouselError::ImageLoad(msg) => msg.clone(),
                    other => other.to_string(),
                });
                outcomes.push(RenderOutcome {
                    suffix: sfondo,
                    result: Err(e),
                });
                outcomes.push(RenderOutcome {
                    suffix: completa,
                    result: Err(repeated),
                });
            }
        }
    }

    if let Some(url) = data.final_slide_image_url.as_deref() {
        let suffix = format!("slide-{}-libro", data.final_slide_number());
        let result = compositor.render(
            ImageSource::parse(url),
            &data.final_slide_sentence,
            &data.title,
            &suffix,
            timeout,
        );
        outcomes.push(RenderOutcome { suffix, result });
    }

    for outcome in &outcomes {
        if let Err(e) = &outcome.result {
            warn!(suffix = %outcome.suffix, error = %e, "carousel image failed");
        }
    }
    info!(
        title = %data.title,
        images = outcomes.len(),
        "carousel rendered"
    );
    outcomes
}

/// The background on its own, re-encoded as PNG.
pub fn background_artifact(background: &DynamicImage, title: &str, suffix: &str) -> Result<Artifact> {
    let png = image_handler::save_image_to_bytes(background)?;
    Ok(Artifact::new(filename::artifact_name(title, suffix), png))
}
