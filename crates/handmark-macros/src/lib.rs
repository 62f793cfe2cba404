//! Procedural macros for `handmark`.
//!
//! This crate is an implementation detail; depend on `handmark` and use `#[handmark::main]`.

use proc_macro::{Span, TokenStream};
use quote::quote;
use syn::{parse::Error, ItemFn};

/// Turns `fn main` into an application entry point.
///
/// The annotated function runs on a background thread after the logger is installed, while the
/// main thread drives the GUI event loop.
#[proc_macro_attribute]
pub fn main(args: TokenStream, item: TokenStream) -> TokenStream {
    expand_main(args, item.clone()).unwrap_or_else(|err| {
        // Keep the original function around so that IDEs still see it.
        let mut tokens = item;
        tokens.extend(TokenStream::from(err.to_compile_error()));
        tokens
    })
}

fn expand_main(args: TokenStream, item: TokenStream) -> syn::Result<TokenStream> {
    if !args.is_empty() {
        return Err(Error::new(
            Span::call_site().into(),
            "`#[handmark::main]` takes no arguments",
        ));
    }

    let item = syn::parse::<ItemFn>(item)?;
    if item.sig.ident != "main" {
        return Err(Error::new(
            item.sig.ident.span(),
            "`#[handmark::main]` can only be applied to `fn main`",
        ));
    }
    if item.sig.asyncness.is_some() {
        return Err(Error::new(
            item.sig.fn_token.span,
            "`#[handmark::main]` does not support `async fn main`",
        ));
    }

    Ok(quote! {
        fn main() {
            #item

            ::handmark::init_logger!();
            ::handmark::run(main);
        }
    }
    .into())
}
