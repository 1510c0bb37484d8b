//! Description, imports, inputs, and outputs elements.
//!
//! These are the plain sections: default schema-directed parsing is
//! enough. Imports are already flattened into the document before
//! resolution runs; the element here only validates what remains.

use super::{
    DESCRIPTION, IMPORT_ITEM, IMPORTS, INPUTS, OUTPUT_DEF, OUTPUT_VALUE, OUTPUTS,
    PROPERTY_SCHEMA, STRING_VALUE,
};
use keystone_core::CompileResult;
use keystone_schema::{DictField, ElementType, Registry, ScalarKind, Schema};

pub(super) fn define(registry: &mut Registry) -> CompileResult<()> {
    registry.define(ElementType::new(
        DESCRIPTION,
        Schema::Scalar(ScalarKind::String),
    ))?;
    registry.define(ElementType::new(IMPORTS, Schema::List(IMPORT_ITEM)))?;
    registry.define(ElementType::new(
        IMPORT_ITEM,
        Schema::Scalar(ScalarKind::String),
    ))?;
    registry.define(ElementType::new(INPUTS, Schema::Map(PROPERTY_SCHEMA)))?;
    registry.define(ElementType::new(OUTPUTS, Schema::Map(OUTPUT_DEF)))?;
    registry.define(ElementType::new(
        OUTPUT_DEF,
        Schema::dict([
            DictField::new("description", STRING_VALUE),
            DictField::new("value", OUTPUT_VALUE),
        ]),
    ))?;
    Ok(())
}
