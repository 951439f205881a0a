//! Recognition algorithms and their parameter records.

use serde::{Deserialize, Serialize};
use serde_json::{json, Number, Value};

use super::{OneOrMany, Target};

/// Recognition area: explicit `[x, y, w, h]` or the hit box of a previously
/// executed node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Region {
    Coords(Vec<i64>),
    Node(String),
}

param_record! { DirectHitParam {} }

param_record! {
    OcrParam {
        roi: Region,
        roi_offset: Vec<i64>,
        expected: OneOrMany<String>,
        threshold: OneOrMany<Number>,
        replace: OneOrMany<(String, String)>,
        order_by: String,
        index: i64,
        only_rec: bool,
        model: String,
    }
}

param_record! {
    TemplateMatchParam {
        roi: Region,
        roi_offset: Vec<i64>,
        template: OneOrMany<String>,
        threshold: OneOrMany<Number>,
        order_by: String,
        index: i64,
        method: i64,
        green_mask: bool,
    }
}

param_record! {
    FeatureMatchParam {
        roi: Region,
        roi_offset: Vec<i64>,
        template: OneOrMany<String>,
        count: i64,
        order_by: String,
        index: i64,
        green_mask: bool,
        detector: String,
        ratio: Number,
    }
}

param_record! {
    ColorMatchParam {
        roi: Region,
        roi_offset: Vec<i64>,
        /// OpenCV colour conversion code.
        method: i64,
        lower: OneOrMany<Vec<i64>>,
        upper: OneOrMany<Vec<i64>>,
        count: i64,
        order_by: String,
        index: i64,
        connected: bool,
    }
}

param_record! {
    ClassifyParam {
        roi: Region,
        roi_offset: Vec<i64>,
        labels: OneOrMany<String>,
        model: String,
        expected: OneOrMany<i64>,
        order_by: String,
        index: i64,
    }
}

param_record! {
    DetectParam {
        roi: Region,
        roi_offset: Vec<i64>,
        labels: OneOrMany<String>,
        model: String,
        expected: OneOrMany<i64>,
        threshold: OneOrMany<Number>,
        order_by: String,
        index: i64,
    }
}

param_record! {
    AndParam {
        /// Sub-recognitions, inline objects or node names.
        all_of: Vec<Value>,
        box_index: i64,
        sub_name: String,
    }
}

param_record! {
    OrParam {
        any_of: Vec<Value>,
    }
}

param_record! {
    CustomRecognitionParam {
        custom_recognition: String,
        custom_recognition_param: Value,
        roi: Target,
        roi_offset: Vec<i64>,
    }
}

algorithm_union! {
    section = "recognition";
    /// What a node looks for on screen before acting.
    pub enum Recognition / RecognitionKind {
        DirectHit(DirectHitParam) = "DirectHit" [],
        Ocr(OcrParam) = "OCR" ["expected" => json!([""])],
        TemplateMatch(TemplateMatchParam) = "TemplateMatch" ["template" => json!([""])],
        FeatureMatch(FeatureMatchParam) = "FeatureMatch" ["template" => json!([""])],
        ColorMatch(ColorMatchParam) = "ColorMatch" [
            "lower" => json!([[0, 0, 0]]),
            "upper" => json!([[255, 255, 255]]),
        ],
        NeuralNetworkClassify(ClassifyParam) = "NeuralNetworkClassify" [
            "model" => json!(""),
            "expected" => json!([0]),
        ],
        NeuralNetworkDetect(DetectParam) = "NeuralNetworkDetect" [
            "model" => json!(""),
            "expected" => json!([0]),
        ],
        And(AndParam) = "And" ["all_of" => json!([{}, {}])],
        Or(OrParam) = "Or" ["any_of" => json!([{}, {}])],
        Custom(CustomRecognitionParam) = "Custom" ["custom_recognition" => json!("")],
    }
}
