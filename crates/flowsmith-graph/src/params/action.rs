//! Actions a node performs after a successful recognition.

use serde_json::{json, Value};

use super::{OneOrMany, Target};

param_record! { DoNothingParam {} }

param_record! {
    ClickParam {
        target: Target,
        target_offset: Vec<i64>,
    }
}

param_record! {
    LongPressParam {
        target: Target,
        target_offset: Vec<i64>,
        duration: i64,
    }
}

param_record! {
    SwipeParam {
        begin: Target,
        begin_offset: Vec<i64>,
        /// One end point, or several for a multi-segment swipe.
        end: OneOrMany<Target>,
        end_offset: OneOrMany<Vec<i64>>,
        duration: OneOrMany<i64>,
        end_hold: OneOrMany<i64>,
        only_hover: bool,
    }
}

param_record! {
    MultiSwipeParam {
        swipes: Vec<Value>,
    }
}

param_record! {
    ScrollParam {
        target: Target,
        target_offset: Vec<i64>,
        dx: i64,
        dy: i64,
    }
}

param_record! {
    TouchParam {
        contact: i64,
        target: Target,
        target_offset: Vec<i64>,
        pressure: i64,
    }
}

param_record! {
    TouchUpParam {
        contact: i64,
    }
}

param_record! {
    ClickKeyParam {
        key: OneOrMany<i64>,
    }
}

param_record! {
    LongPressKeyParam {
        key: i64,
        duration: i64,
    }
}

param_record! {
    KeyParam {
        key: i64,
    }
}

param_record! {
    InputTextParam {
        input_text: String,
    }
}

param_record! {
    AppParam {
        package: String,
    }
}

param_record! { StopTaskParam {} }

param_record! {
    CommandParam {
        exec: String,
        args: OneOrMany<String>,
        detach: bool,
    }
}

param_record! {
    ShellParam {
        cmd: String,
        timeout: i64,
    }
}

param_record! {
    CustomActionParam {
        custom_action: String,
        custom_action_param: Value,
        target: Target,
        target_offset: Vec<i64>,
    }
}

algorithm_union! {
    section = "action";
    /// What a node does once its recognition hits.
    pub enum Action / ActionKind {
        DoNothing(DoNothingParam) = "DoNothing" [],
        Click(ClickParam) = "Click" [],
        LongPress(LongPressParam) = "LongPress" [],
        Swipe(SwipeParam) = "Swipe" [],
        MultiSwipe(MultiSwipeParam) = "MultiSwipe" ["swipes" => json!([{}])],
        Scroll(ScrollParam) = "Scroll" [],
        TouchDown(TouchParam) = "TouchDown" [],
        TouchMove(TouchParam) = "TouchMove" [],
        TouchUp(TouchUpParam) = "TouchUp" [],
        ClickKey(ClickKeyParam) = "ClickKey" ["key" => json!([1])],
        LongPressKey(LongPressKeyParam) = "LongPressKey" ["key" => json!(1)],
        KeyDown(KeyParam) = "KeyDown" ["key" => json!(1)],
        KeyUp(KeyParam) = "KeyUp" ["key" => json!(1)],
        /// Older name of `ClickKey`, still written by some documents.
        Key(ClickKeyParam) = "Key" ["key" => json!([1])],
        InputText(InputTextParam) = "InputText" ["input_text" => json!("")],
        StartApp(AppParam) = "StartApp" ["package" => json!("")],
        StopApp(AppParam) = "StopApp" ["package" => json!("")],
        StopTask(StopTaskParam) = "StopTask" [],
        Command(CommandParam) = "Command" ["exec" => json!("")],
        Shell(ShellParam) = "Shell" ["cmd" => json!("")],
        Custom(CustomActionParam) = "Custom" ["custom_action" => json!("")],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::FieldValue;

    #[test]
    fn deprecated_key_alias_is_distinct_kind() {
        assert_eq!(ActionKind::parse("key"), Some(ActionKind::Key));
        assert_eq!(ActionKind::parse("clickkey"), Some(ActionKind::ClickKey));
        assert_eq!(ActionKind::Key.keys(), ActionKind::ClickKey.keys());
    }

    #[test]
    fn swipe_end_accepts_single_or_list() {
        let single = Action::from_parts(
            ActionKind::Swipe,
            json!({"begin": true, "end": [10, 10, 0, 0]}).as_object().unwrap().clone(),
        );
        match &single {
            Action::Swipe(p) => {
                assert_eq!(p.begin, Some(Target::Flag(true)));
                assert_eq!(p.end, Some(OneOrMany::One(Target::Coords(vec![10, 10, 0, 0]))));
            }
            other => panic!("unexpected variant {other:?}"),
        }
        let multi = Action::from_parts(
            ActionKind::Swipe,
            json!({"end": [[1, 1, 0, 0], "Other"]}).as_object().unwrap().clone(),
        );
        match &multi {
            Action::Swipe(p) => assert!(matches!(p.end, Some(OneOrMany::Many(ref v)) if v.len() == 2)),
            other => panic!("unexpected variant {other:?}"),
        }
    }

    #[test]
    fn key_press_types_need_a_key() {
        for kind in [ActionKind::ClickKey, ActionKind::LongPressKey, ActionKind::KeyDown, ActionKind::KeyUp] {
            let action = Action::with_defaults(kind);
            assert!(action.param().contains_key("key"), "{kind} has no key");
        }
        assert_eq!(Action::with_defaults(ActionKind::LongPressKey).param()["key"], json!(1));
    }

    #[test]
    fn click_to_long_press_keeps_target() {
        let mut action = Action::with_defaults(ActionKind::Click);
        action.set_field("target", FieldValue::Set(json!("Banner"))).unwrap();
        action.set_field("target_offset", FieldValue::Set(json!([5, 5, 0, 0]))).unwrap();
        let converted = action.convert_to(ActionKind::LongPress);
        assert_eq!(converted.kind(), ActionKind::LongPress);
        assert_eq!(converted.param()["target"], json!("Banner"));
        assert_eq!(converted.param()["target_offset"], json!([5, 5, 0, 0]));
        let converted = action.convert_to(ActionKind::InputText);
        assert_eq!(converted.param().len(), 1);
        assert_eq!(converted.param()["input_text"], json!(""));
    }

    #[test]
    fn click_key_list_to_key_down_scalar_falls_back_to_default() {
        let mut action = Action::with_defaults(ActionKind::ClickKey);
        action.set_field("key", FieldValue::Set(json!([4, 5]))).unwrap();
        let converted = action.convert_to(ActionKind::KeyDown);
        assert_eq!(converted.param()["key"], json!(1));
    }
}
