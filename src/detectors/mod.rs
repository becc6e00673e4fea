//! 用法检测器: 只读遍历语法树, 收集查询用到的属性、值、卡片类型、标签等。
//!
//! 每个检测器对子条件都新建一个同类检测器, 再把结果并入自己的集合。

mod card_type;
mod card_usage;
mod condition_detection;
mod implied_card_type;
mod project_variable;
mod property_definition;
mod property_value;
mod tagged_with;

pub use card_type::CardTypeDetector;
pub use card_usage::{CardReference, CardUsageDetector};
pub use condition_detection::{contains_condition, uses_this_card, ConditionDetection};
pub use implied_card_type::ImpliedCardTypeDetector;
pub use project_variable::ProjectVariableDetector;
pub use property_definition::PropertyDefinitionDetector;
pub use property_value::{PropertyValue, PropertyValueDetector};
pub use tagged_with::TaggedWithDetector;
