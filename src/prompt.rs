//! Instruction text sent to the model alongside the photo.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

pub const DEFAULT_BACKGROUND_COLOR: &str = "#000080";

/// Where on the garment the finished design goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ClothingPart {
    #[default]
    Neckline,
    Cuff,
    Border,
    #[serde(rename = "Standalone Motif", alias = "Motif")]
    Motif,
}

impl ClothingPart {
    pub const ALL: [ClothingPart; 4] = [
        ClothingPart::Neckline,
        ClothingPart::Cuff,
        ClothingPart::Border,
        ClothingPart::Motif,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ClothingPart::Neckline => "Neckline",
            ClothingPart::Cuff => "Cuff",
            ClothingPart::Border => "Border",
            ClothingPart::Motif => "Standalone Motif",
        }
    }

    fn layout_guidance(self) -> &'static str {
        match self {
            ClothingPart::Neckline => "Create a U-shaped design that follows the curve of a collar.",
            ClothingPart::Cuff => "Create a rectangular band that wraps around a sleeve end.",
            ClothingPart::Border => "Create a long, repeating horizontal pattern.",
            ClothingPart::Motif => "Center the single design element on the canvas.",
        }
    }
}

impl fmt::Display for ClothingPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ClothingPart {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        ClothingPart::ALL
            .into_iter()
            .find(|part| {
                part.label().eq_ignore_ascii_case(trimmed)
                    || format!("{part:?}").eq_ignore_ascii_case(trimmed)
            })
            .ok_or_else(|| format!("unknown clothing part '{trimmed}'"))
    }
}

/// Value/label pair for the category picker.
#[derive(Debug, Clone, Serialize)]
pub struct ClothingPartOption {
    pub value: ClothingPart,
    pub label: &'static str,
}

pub fn clothing_part_options() -> Vec<ClothingPartOption> {
    ClothingPart::ALL
        .into_iter()
        .map(|value| ClothingPartOption {
            value,
            label: value.label(),
        })
        .collect()
}

/// Builds the digitizer instructions. The color is embedded as given.
pub fn build_prompt(background_color: &str, clothing_part: ClothingPart) -> String {
    format!(
        r#"You are an expert AI embroidery digitizer. Your task is to convert the user-provided photograph of fabric embroidery into a high-resolution digital embroidery blueprint suitable for machine embroidery mockups.

Follow these instructions precisely:

1. **Isolate the Pattern:** Identify and perfectly segment the main embroidery pattern from the original fabric. Remove all traces of the original fabric texture, shadows, and surroundings.

2. **Symmetrize:** Analyze the embroidery pattern and make it perfectly symmetrical along its central vertical axis. Correct any asymmetries or distortions present in the original photo due to camera angle or hand-stitching imperfections.

3. **Color Preservation & Enhancement:**
   * Accurately identify all distinct colors in the original embroidery.
   * Preserve these exact colors in the final output.
   * Make the colors sharp, vibrant, and high-contrast, as if they were digital vector colors.

4. **Vectorize & Clean Lines:**
   * Convert all stitch lines into clean, smooth, and sharp digital lines. Remove any fuzziness, loose threads, or irregularities. The final output should look like a clean vector graphic, not a photo.

5. **Stitch Texture Simulation:**
   * For each colored region of the design, apply a realistic digital stitch texture.
   * Use a dense satin stitch texture for outlines and thinner lines.
   * Use a fill stitch texture for larger colored areas.
   * The texture should follow the contours of the design.

6. **Canvas & Grid:**
   * Place the final, cleaned, and symmetrized design onto a solid, uniform canvas color of: {background_color}.
   * Overlay a subtle, light-colored grid on top of the canvas to give it a CAD-like appearance. The grid lines should be visible but not distracting from the main design.

7. **Layout Adjustment:**
   * The user has specified this is for a '{clothing_part}'. Adapt the final composition to suit this type of garment placement. {guidance}

8. **Final Output:**
   * The final image should be a high-resolution digital rendering. It must not look like a photograph. It should be a professional-grade digital embroidery design sheet. Return ONLY the image.
"#,
        background_color = background_color,
        clothing_part = clothing_part.label(),
        guidance = clothing_part.layout_guidance(),
    )
}
