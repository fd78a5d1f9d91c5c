//! 工具参数：JSON Schema 生成（schemars）与反序列化
//!
//! 各工具的参数结构体同时派生 JsonSchema 与 Deserialize：生成的 schema 作为
//! function.parameters 交给模型，execute 时再用 [`parse_args`] 解析同一结构体。

use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// 把模型给出的参数解析为工具的参数结构体；null 视为空对象
pub fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, String> {
    let args = if args.is_null() {
        Value::Object(Default::default())
    } else {
        args
    };
    serde_json::from_value(args).map_err(|e| format!("Invalid arguments: {e}"))
}

/// 返回参数类型的 JSON Schema（去掉 $schema / title 等元信息）
pub fn parameters_for<T: JsonSchema>() -> Value {
    let mut schema = serde_json::to_value(schema_for!(T)).unwrap_or_else(|_| {
        serde_json::json!({ "type": "object", "properties": {} })
    });
    if let Some(obj) = schema.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
    }
    schema
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(serde::Deserialize, JsonSchema)]
    struct Args {
        /// 要分析的文本
        text: String,
        limit: Option<u32>,
    }

    #[test]
    fn schema_lists_required_fields_only() {
        let schema = parameters_for::<Args>();
        assert_eq!(schema["type"], "object");
        assert!(schema["properties"]["text"].is_object());
        assert!(schema.get("$schema").is_none());
        let required = schema["required"].as_array().unwrap();
        assert_eq!(required.len(), 1);
        assert_eq!(required[0], "text");
    }

    #[test]
    fn parse_args_treats_null_as_empty_object() {
        let err = parse_args::<Args>(Value::Null).err().unwrap();
        assert!(err.starts_with("Invalid arguments"));

        let args: Args = parse_args(serde_json::json!({ "text": "hi", "limit": 3 })).unwrap();
        assert_eq!(args.text, "hi");
        assert_eq!(args.limit, Some(3));
    }
}
