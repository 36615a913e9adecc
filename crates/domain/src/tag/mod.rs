mod behavior;
mod data_type;
mod entity;
mod generator;
mod quality;
mod tag_id;
mod value;

pub use behavior::TagBehavior;
pub use data_type::TagDataType;
pub use entity::Tag;
pub use generator::{
    ConstantGenerator, GeneratorFactory, LinearGenerator, RandomUniformGenerator,
    SinusoidalGenerator, SteppedGenerator, TagValueGenerator,
};
pub use quality::{QualityModel, TagQuality};
pub use tag_id::{TagId, validate_identifier};
pub use value::TagValue;
