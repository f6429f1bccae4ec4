// Copyright 2023 Greptime Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Implementation of `#[stack_trace_debug]`.

use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::quote;
use syn::{Ident, ItemEnum, Variant};

pub fn stack_trace_style_impl(args: TokenStream2, input: TokenStream2) -> TokenStream2 {
    let input_cloned: TokenStream2 = input.clone();

    let error_enum_definition: ItemEnum = match syn::parse2(input_cloned) {
        Ok(item) => item,
        Err(e) => return e.into_compile_error(),
    };
    let enum_name = error_enum_definition.ident;

    let variants = error_enum_definition
        .variants
        .into_iter()
        .map(ErrorVariant::from_enum_variant)
        .collect::<Vec<_>>();

    let debug_fmt_fn = build_debug_fmt_impl(&enum_name, &variants);
    let next_fn = build_next_impl(&enum_name, &variants);
    let debug_impl = build_debug_impl(&enum_name);

    quote! {
        #args
        #input

        impl ::common_error::ext::StackError for #enum_name {
            #debug_fmt_fn
            #next_fn
        }

        #debug_impl
    }
}

/// Generate `debug_fmt` fn.
///
/// The generated fn will be like:
/// ```rust, ignore
/// fn debug_fmt(&self, layer: usize, buf: &mut Vec<String>);
/// ```
fn build_debug_fmt_impl(enum_name: &Ident, variants: &[ErrorVariant]) -> TokenStream2 {
    let match_arms = variants
        .iter()
        .map(|v| v.to_debug_match_arm(enum_name))
        .collect::<Vec<_>>();

    quote! {
        fn debug_fmt(&self, layer: usize, buf: &mut Vec<String>) {
            match self {
                #(#match_arms)*
            }
        }
    }
}

/// Generate `next` fn.
///
/// The generated fn will be like:
/// ```rust, ignore
/// fn next(&self) -> Option<&dyn ::common_error::ext::StackError>;
/// ```
fn build_next_impl(enum_name: &Ident, variants: &[ErrorVariant]) -> TokenStream2 {
    let match_arms = variants
        .iter()
        .map(|v| v.to_next_match_arm(enum_name))
        .collect::<Vec<_>>();

    quote! {
        fn next(&self) -> Option<&dyn ::common_error::ext::StackError> {
            match self {
                #(#match_arms)*
            }
        }
    }
}

/// Implement [std::fmt::Debug] via `debug_fmt`
fn build_debug_impl(enum_name: &Ident) -> TokenStream2 {
    quote! {
        impl std::fmt::Debug for #enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                use ::common_error::ext::StackError;
                let mut buf = vec![];
                self.debug_fmt(0, &mut buf);
                write!(f, "{}", buf.join("\n"))
            }
        }
    }
}

struct ErrorVariant {
    name: Ident,
    has_location: bool,
    has_source: bool,
    has_external_cause: bool,
}

impl ErrorVariant {
    /// Construct self from [Variant]
    fn from_enum_variant(variant: Variant) -> Self {
        let mut has_location = false;
        let mut has_source = false;
        let mut has_external_cause = false;

        for field in &variant.fields {
            if let Some(ident) = &field.ident {
                if ident == "location" {
                    has_location = true;
                } else if ident == "source" {
                    has_source = true;
                } else if ident == "error" {
                    has_external_cause = true;
                }
            }
        }

        Self {
            name: variant.ident,
            has_location,
            has_source,
            has_external_cause,
        }
    }

    /// Convert self into a match arm that pushes this layer and the ones
    /// below it into `buf`.
    fn to_debug_match_arm(&self, enum_name: &Ident) -> TokenStream2 {
        let name = &self.name;

        let this_layer = if self.has_location {
            quote! { buf.push(format!("{layer}: {}, at {}", self, location)); }
        } else {
            quote! { buf.push(format!("{layer}: {}", self)); }
        };
        let next_layer = if self.has_source {
            quote! { ::common_error::ext::StackError::debug_fmt(source, layer + 1, buf); }
        } else if self.has_external_cause {
            quote! { buf.push(format!("{}: {:?}", layer + 1, error)); }
        } else {
            quote! {}
        };
        let bindings = self.bindings();

        quote! {
            #enum_name::#name { #(#bindings,)* .. } => {
                #this_layer
                #next_layer
            }
        }
    }

    /// Convert self into a match arm that returns the next internal error.
    fn to_next_match_arm(&self, enum_name: &Ident) -> TokenStream2 {
        let name = &self.name;
        if self.has_source {
            quote! { #enum_name::#name { source, .. } => Some(source), }
        } else {
            quote! { #enum_name::#name { .. } => None, }
        }
    }

    fn bindings(&self) -> Vec<Ident> {
        let mut bindings = Vec::new();
        if self.has_location {
            bindings.push(Ident::new("location", Span::call_site()));
        }
        if self.has_source {
            bindings.push(Ident::new("source", Span::call_site()));
        } else if self.has_external_cause {
            bindings.push(Ident::new("error", Span::call_site()));
        }
        bindings
    }
}
