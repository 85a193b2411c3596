mod model_object;

use proc_macro::TokenStream;

// ============================================================================
// #[derive(ModelObject)]
// ============================================================================

/// Derive macro that implements `survey_model::ModelObject`.
///
/// On a struct, the object type comes from `#[model(object_type = "...")]`
/// or defaults to the snake_case struct name:
///
/// ```ignore
/// #[derive(Clone, PartialEq, ModelObject)]
/// #[model(object_type = "zone")]
/// struct Zone {
///     name: String,
/// }
/// ```
///
/// On an enum, every variant is its own object type, named by the variant's
/// `#[model(object_type = "...")]` or by its snake_case name:
///
/// ```ignore
/// #[derive(Clone, PartialEq, ModelObject)]
/// enum SurveyObject {
///     #[model(object_type = "plan")]
///     Plan(Plan),
///     Track { name: String },
///     SonarParams(Params),   // "sonar_params"
/// }
/// ```
#[proc_macro_derive(ModelObject, attributes(model))]
pub fn derive_model_object(input: TokenStream) -> TokenStream {
    model_object::derive_model_object(input)
}
