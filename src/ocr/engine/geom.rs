use serde::Deserialize;

use crate::ocr::BBox;

/// Box geometry as engines emit it. Every accepted convention collapses to [`BBox`].
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawBBox {
    Tuple([f64; 4]),
    Corners {
        x0: f64,
        y0: f64,
        x1: f64,
        y1: f64,
    },
    Sized {
        #[serde(alias = "left")]
        x: f64,
        #[serde(alias = "top")]
        y: f64,
        #[serde(alias = "w")]
        width: f64,
        #[serde(alias = "h")]
        height: f64,
    },
}

impl RawBBox {
    pub(crate) fn normalize(self) -> BBox {
        let (x, y, width, height) = match self {
            RawBBox::Tuple([x, y, width, height]) => (x, y, width, height),
            RawBBox::Corners { x0, y0, x1, y1 } => {
                (x0.min(x1), y0.min(y1), (x1 - x0).abs(), (y1 - y0).abs())
            }
            RawBBox::Sized {
                x,
                y,
                width,
                height,
            } => (x, y, width, height),
        };
        BBox::new(to_px(x), to_px(y), to_px(width), to_px(height))
    }
}

fn to_px(value: f64) -> u32 {
    if value.is_finite() {
        value.round().clamp(0.0, u32::MAX as f64) as u32
    } else {
        0
    }
}

pub(super) fn union_bbox(a: &BBox, b: &BBox) -> BBox {
    let x1 = a.x.min(b.x);
    let y1 = a.y.min(b.y);
    let x2 = a.right().max(b.right());
    let y2 = a.bottom().max(b.bottom());
    BBox::new(x1, y1, x2 - x1, y2 - y1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> BBox {
        serde_json::from_str::<RawBBox>(json)
            .expect("bbox json")
            .normalize()
    }

    #[test]
    fn every_convention_lands_on_the_same_box() {
        let expected = BBox::new(10, 20, 30, 40);
        assert_eq!(parse(r#"{"x":10,"y":20,"width":30,"height":40}"#), expected);
        assert_eq!(parse(r#"{"x":10,"y":20,"w":30,"h":40}"#), expected);
        assert_eq!(parse(r#"{"left":10,"top":20,"width":30,"height":40}"#), expected);
        assert_eq!(parse(r#"{"x0":10,"y0":20,"x1":40,"y1":60}"#), expected);
        assert_eq!(parse("[10,20,30,40]"), expected);
    }

    #[test]
    fn fractional_and_negative_values_are_rounded_and_clamped() {
        assert_eq!(
            parse(r#"{"x":-3.2,"y":4.6,"w":10.4,"h":0.5}"#),
            BBox::new(0, 5, 10, 1)
        );
    }

    #[test]
    fn swapped_corners_are_reordered() {
        assert_eq!(
            parse(r#"{"x0":40,"y0":60,"x1":10,"y1":20}"#),
            BBox::new(10, 20, 30, 40)
        );
    }

    #[test]
    fn union_covers_both_boxes() {
        let a = BBox::new(0, 0, 10, 10);
        let b = BBox::new(5, 8, 10, 10);
        assert_eq!(union_bbox(&a, &b), BBox::new(0, 0, 15, 18));
    }

    #[test]
    fn huge_boxes_saturate_instead_of_overflowing() {
        let far = parse(r#"{"x":4000000000,"y":0,"width":4000000000,"height":10}"#);
        assert_eq!(far.right(), u32::MAX);
        let merged = union_bbox(&far, &BBox::new(0, 0, 10, 10));
        assert_eq!(merged, BBox::new(0, 0, u32::MAX, 10));
    }
}
