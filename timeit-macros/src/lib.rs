//! timeit Macros
//!
//! Attribute macros that time every call of the decorated function.
//!
//! ## Macros
//!
//! - `#[timeit_sync]` - Time a synchronous function
//! - `#[timeit_async]` - Time an `async fn`
//! - `#[timeit]` - Deprecated, picks one of the above from the signature
//!
//! The decorated function keeps its exact signature. Failures of the timed
//! call surface as panics, the way an undecorated call would have failed.

use proc_macro::TokenStream;
use proc_macro2::{TokenStream as TokenStream2, TokenTree};
use quote::{format_ident, quote};
use syn::{FnArg, ItemFn, Pat, ReturnType, parse_macro_input};

// ============================================================================
// Attribute Parsing Helpers
// ============================================================================

mod attr {
    use syn::meta::ParseNestedMeta;

    /// Get the attribute name as a string
    pub fn name(meta: &ParseNestedMeta) -> String {
        meta.path
            .get_ident()
            .map(|i| i.to_string())
            .unwrap_or_default()
    }

    /// Parse a string literal attribute: `attr = "value"`
    pub fn string(meta: &ParseNestedMeta) -> syn::Result<String> {
        let value: syn::LitStr = meta.value()?.parse()?;
        Ok(value.value())
    }

    /// Parse an integer literal attribute: `attr = 42`
    pub fn int(meta: &ParseNestedMeta) -> syn::Result<usize> {
        let value: syn::LitInt = meta.value()?.parse()?;
        value.base10_parse()
    }

    /// Parse a seconds value: `attr = 1.5`, `attr = 2` or `attr = "500ms"`
    pub fn seconds(meta: &ParseNestedMeta) -> syn::Result<f64> {
        let value: syn::Lit = meta.value()?.parse()?;
        match &value {
            syn::Lit::Float(f) => f.base10_parse(),
            syn::Lit::Int(i) => i.base10_parse::<u64>().map(|v| v as f64),
            syn::Lit::Str(s) => super::parse_duration(&s.value())
                .ok_or_else(|| syn::Error::new_spanned(s, "invalid duration, expected e.g. \"500ms\"")),
            other => Err(syn::Error::new_spanned(other, "expected seconds or a duration string")),
        }
    }

    /// Parse a boolean attribute: `attr = true`, or a bare `attr`
    pub fn bool(meta: &ParseNestedMeta) -> syn::Result<bool> {
        if meta.input.is_empty() || meta.input.peek(syn::Token![,]) {
            return Ok(true);
        }
        let value: syn::LitBool = meta.value()?.parse()?;
        Ok(value.value())
    }

    /// Create an unknown attribute error
    pub fn unknown(meta: &ParseNestedMeta, name: &str) -> syn::Error {
        meta.error(format!("unknown attribute: {}", name))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Sync,
    Async,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum SubstrateArg {
    None,
    #[default]
    Threads,
    Processes,
    Cooperative,
}

#[derive(Debug, Default)]
struct TimeitArgs {
    runs: Option<usize>,
    workers: Option<usize>,
    timeout: Option<f64>,
    enforce_timeout: bool,
    substrate: SubstrateArg,
    detailed: bool,
    log_level: Option<syn::Ident>,
}

/// Time every call of a synchronous function
///
/// # Example
///
/// ```ignore
/// #[timeit_sync(runs = 10, workers = 4, timeout = "50ms")]
/// fn checksum(data: Vec<u8>) -> u32 {
///     data.iter().map(|&b| b as u32).sum()
/// }
///
/// // Worker processes need a free function declared at module level
/// #[timeit_sync(runs = 4, workers = 2, substrate = "processes")]
/// fn isolated(n: u64) -> u64 { n * 2 }
/// ```
#[proc_macro_attribute]
pub fn timeit_sync(args: TokenStream, item: TokenStream) -> TokenStream {
    let func = parse_macro_input!(item as ItemFn);
    timeit_impl(TokenStream2::from(args), func, Some(Mode::Sync), false)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}

/// Time every call of an `async fn`
///
/// # Example
///
/// ```ignore
/// #[timeit_async(runs = 3, workers = 3, timeout = 1.0, enforce_timeout = true)]
/// async fn fetch(url: String) -> usize {
///     download(&url).await.len()
/// }
/// ```
#[proc_macro_attribute]
pub fn timeit_async(args: TokenStream, item: TokenStream) -> TokenStream {
    let func = parse_macro_input!(item as ItemFn);
    timeit_impl(TokenStream2::from(args), func, Some(Mode::Async), false)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}

/// Deprecated: use `#[timeit_sync]` or `#[timeit_async]`
///
/// Dispatches on whether the function is `async`. The first call reports a
/// deprecation notice.
#[proc_macro_attribute]
pub fn timeit(args: TokenStream, item: TokenStream) -> TokenStream {
    let func = parse_macro_input!(item as ItemFn);
    timeit_impl(TokenStream2::from(args), func, None, true)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}

fn timeit_impl(
    args: TokenStream2,
    func: ItemFn,
    mode: Option<Mode>,
    legacy: bool,
) -> syn::Result<TokenStream2> {
    let is_async = func.sig.asyncness.is_some();
    let mode = match (mode, is_async) {
        (None, true) | (Some(Mode::Async), true) => Mode::Async,
        (None, false) | (Some(Mode::Sync), false) => Mode::Sync,
        (Some(Mode::Sync), true) => {
            return Err(syn::Error::new_spanned(
                &func.sig,
                "timeit: #[timeit_sync] cannot decorate an async fn, use #[timeit_async]",
            ));
        }
        (Some(Mode::Async), false) => {
            return Err(syn::Error::new_spanned(
                &func.sig,
                "timeit: #[timeit_async] needs an async fn, use #[timeit_sync]",
            ));
        }
    };

    let config = parse_timeit_args(args)?;
    validate_config(&config, mode, &func)?;
    validate_signature(&func)?;

    let name = func.sig.ident.to_string();
    let config_expr = config_tokens(&config);
    let constructor = if legacy {
        quote! { legacy }
    } else {
        quote! { new }
    };
    let state = quote! {
        static __TIMEIT: ::timeit::internal::Decorated =
            ::timeit::internal::Decorated::#constructor(#name, #config_expr);
    };

    let params = Params::split(&func);
    if config.substrate == SubstrateArg::Processes {
        validate_process_signature(&func)?;
        return Ok(expand_process(&func, &params, state));
    }

    let ItemFn {
        attrs,
        vis,
        mut sig,
        block,
    } = func;
    sig.inputs = params.outer.clone();
    let args_tuple = params.args_tuple();
    let pats = &params.pats;
    let output = &sig.output;

    let call = match mode {
        Mode::Sync => {
            let ret = closure_return(output);
            quote! {
                __TIMEIT.invoke_sync(#args_tuple, |(#(#pats,)*)| #ret #block)
            }
        }
        Mode::Async => {
            let pinned = match output {
                ReturnType::Type(_, ty) if !contains_impl(quote!(#ty)) => {
                    quote! { ::timeit::internal::async_body::<#ty, _> }
                }
                ReturnType::Default => quote! { ::timeit::internal::async_body::<(), _> },
                ReturnType::Type(..) => quote! { ::core::convert::identity },
            };
            quote! {
                __TIMEIT
                    .invoke_async(#args_tuple, move |(#(#pats,)*)| #pinned(async move #block))
                    .await
            }
        }
    };

    Ok(quote! {
        #(#attrs)*
        #vis #sig {
            #state
            #call
        }
    })
}

/// Registered body plus a wrapper that may ship calls to worker processes
fn expand_process(func: &ItemFn, params: &Params, state: TokenStream2) -> TokenStream2 {
    let ItemFn {
        attrs,
        vis,
        sig,
        block,
    } = func;
    let fn_name = &sig.ident;
    let body_name = format_ident!("__timeit_body_{}", fn_name);
    let target_name = format_ident!("__timeit_process_{}", fn_name);
    let id = quote! { ::core::concat!(::core::module_path!(), "::", ::core::stringify!(#fn_name)) };

    let pats = &params.pats;
    let tys = &params.tys;
    let ret = match &sig.output {
        ReturnType::Default => quote! { () },
        ReturnType::Type(_, ty) => quote! { #ty },
    };

    let mut outer = sig.clone();
    outer.inputs = params.outer.clone();
    let args_tuple = params.args_tuple();

    quote! {
        #[doc(hidden)]
        #[allow(non_snake_case)]
        fn #body_name((#(#pats,)*): (#(#tys,)*)) -> #ret #block

        #[doc(hidden)]
        #[allow(non_upper_case_globals)]
        static #target_name: ::timeit::process::ProcessFn<(#(#tys,)*), #ret> =
            ::timeit::process::ProcessFn::new(#id, #body_name);

        ::timeit::__private::inventory::submit! {
            ::timeit::process::ProcessTarget::new(#id, {
                fn invoke(
                    payload: &[u8],
                ) -> ::core::result::Result<::std::vec::Vec<u8>, ::timeit::process::InvokeError> {
                    #target_name.invoke_encoded(payload)
                }
                invoke
            })
        }

        #(#attrs)*
        #vis #outer {
            #state
            __TIMEIT.invoke_process(#args_tuple, &#target_name)
        }
    }
}

/// Parameters split into the renamed outer signature and the original patterns
struct Params {
    outer: syn::punctuated::Punctuated<FnArg, syn::Token![,]>,
    idents: Vec<syn::Ident>,
    pats: Vec<Pat>,
    tys: Vec<syn::Type>,
}

impl Params {
    fn split(func: &ItemFn) -> Self {
        let mut outer = syn::punctuated::Punctuated::new();
        let mut idents = Vec::new();
        let mut pats = Vec::new();
        let mut tys = Vec::new();

        for input in &func.sig.inputs {
            match input {
                FnArg::Receiver(receiver) => outer.push(FnArg::Receiver(receiver.clone())),
                FnArg::Typed(typed) => {
                    let ident = format_ident!("__timeit_arg{}", idents.len());
                    let mut renamed = typed.clone();
                    renamed.pat = Box::new(Pat::Ident(syn::PatIdent {
                        attrs: Vec::new(),
                        by_ref: None,
                        mutability: None,
                        ident: ident.clone(),
                        subpat: None,
                    }));
                    outer.push(FnArg::Typed(renamed));
                    idents.push(ident);
                    pats.push((*typed.pat).clone());
                    tys.push((*typed.ty).clone());
                }
            }
        }

        Self {
            outer,
            idents,
            pats,
            tys,
        }
    }

    fn args_tuple(&self) -> TokenStream2 {
        let idents = &self.idents;
        quote! { (#(#idents,)*) }
    }
}

/// Annotate the closure only when the type can be restated verbatim.
///
/// Elided lifetimes and `impl Trait` do not carry over into a closure
/// signature; those bodies rely on inference from the call.
fn closure_return(output: &ReturnType) -> TokenStream2 {
    match output {
        ReturnType::Default => quote! { -> () },
        ReturnType::Type(_, ty) => {
            let tokens = quote!(#ty);
            if contains_impl(tokens.clone()) || contains_lifetime_or_ref(tokens) {
                quote! {}
            } else {
                quote! { -> #ty }
            }
        }
    }
}

fn contains_impl(tokens: TokenStream2) -> bool {
    tokens.into_iter().any(|tree| match tree {
        TokenTree::Ident(ident) => ident == "impl",
        TokenTree::Group(group) => contains_impl(group.stream()),
        _ => false,
    })
}

fn contains_lifetime_or_ref(tokens: TokenStream2) -> bool {
    tokens.into_iter().any(|tree| match tree {
        TokenTree::Punct(punct) => punct.as_char() == '&' || punct.as_char() == '\'',
        TokenTree::Group(group) => contains_lifetime_or_ref(group.stream()),
        _ => false,
    })
}

fn parse_timeit_args(args: TokenStream2) -> syn::Result<TimeitArgs> {
    let mut config = TimeitArgs::default();
    if args.is_empty() {
        return Ok(config);
    }

    let parser = syn::meta::parser(|meta| {
        let name = attr::name(&meta);
        match name.as_str() {
            "runs" => config.runs = Some(attr::int(&meta)?),
            "workers" => config.workers = Some(attr::int(&meta)?),
            "timeout" => config.timeout = Some(attr::seconds(&meta)?),
            "enforce_timeout" => config.enforce_timeout = attr::bool(&meta)?,
            "detailed" => config.detailed = attr::bool(&meta)?,
            "substrate" => {
                config.substrate = match attr::string(&meta)?.as_str() {
                    "none" => SubstrateArg::None,
                    "threads" => SubstrateArg::Threads,
                    "processes" => SubstrateArg::Processes,
                    "cooperative" => SubstrateArg::Cooperative,
                    other => {
                        return Err(meta.error(format!(
                            "unknown substrate `{other}`, expected none, threads, processes or cooperative"
                        )));
                    }
                }
            }
            "log_level" => {
                let level = attr::string(&meta)?;
                let variant = match level.to_ascii_lowercase().as_str() {
                    "trace" => "Trace",
                    "debug" => "Debug",
                    "info" => "Info",
                    "warn" | "warning" => "Warn",
                    "error" => "Error",
                    _ => return Err(meta.error(format!("unknown log level `{level}`"))),
                };
                config.log_level = Some(format_ident!("{}", variant));
            }
            _ => return Err(attr::unknown(&meta, &name)),
        }
        Ok(())
    });

    syn::parse::Parser::parse2(parser, args)?;
    Ok(config)
}

/// Reject invalid combinations at expansion time
fn validate_config(config: &TimeitArgs, mode: Mode, func: &ItemFn) -> syn::Result<()> {
    let error = |msg: &str| Err(syn::Error::new_spanned(&func.sig.ident, format!("timeit: {msg}")));

    if config.runs == Some(0) {
        return error("runs must be at least 1");
    }
    if config.workers == Some(0) {
        return error("workers must be at least 1");
    }
    if let Some(timeout) = config.timeout {
        if !timeout.is_finite() || timeout <= 0.0 {
            return error("timeout must be a positive number of seconds");
        }
    }
    match (config.substrate, mode) {
        (SubstrateArg::Processes, _) if config.enforce_timeout => {
            error("enforce_timeout is not supported with the processes substrate")
        }
        (SubstrateArg::Processes, Mode::Async) => {
            error("the processes substrate can only time synchronous functions")
        }
        (SubstrateArg::Cooperative, Mode::Sync) => {
            error("the cooperative substrate can only time async functions")
        }
        _ => Ok(()),
    }
}

fn validate_signature(func: &ItemFn) -> syn::Result<()> {
    let sig = &func.sig;
    if let Some(constness) = &sig.constness {
        return Err(syn::Error::new_spanned(constness, "timeit: cannot time a const fn"));
    }
    for input in &sig.inputs {
        if let FnArg::Receiver(receiver) = input {
            if receiver.reference.is_none() || receiver.mutability.is_some() {
                return Err(syn::Error::new_spanned(
                    receiver,
                    "timeit: methods must take `&self`; repeated runs cannot share `&mut self` or consume `self`",
                ));
            }
        }
    }
    Ok(())
}

/// Extra restrictions for the processes substrate, checked at expansion
fn validate_process_signature(func: &ItemFn) -> syn::Result<()> {
    let sig = &func.sig;
    if let Some(FnArg::Receiver(receiver)) = sig.inputs.first() {
        return Err(syn::Error::new_spanned(
            receiver,
            "timeit: the processes substrate needs a free function",
        ));
    }
    if !sig.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &sig.generics,
            "timeit: the processes substrate cannot register generic functions",
        ));
    }
    if let ReturnType::Type(_, ty) = &sig.output {
        if contains_impl(quote!(#ty)) {
            return Err(syn::Error::new_spanned(
                ty,
                "timeit: the processes substrate needs a concrete return type",
            ));
        }
    }
    Ok(())
}

fn config_tokens(config: &TimeitArgs) -> TokenStream2 {
    let mut fields = Vec::new();
    if let Some(runs) = config.runs {
        fields.push(quote! { runs: #runs, });
    }
    if let Some(workers) = config.workers {
        fields.push(quote! { workers: #workers, });
    }
    if let Some(timeout) = config.timeout {
        fields.push(quote! { timeout: ::core::option::Option::Some(#timeout), });
    }
    if config.enforce_timeout {
        fields.push(quote! { enforce_timeout: true, });
    }
    if config.detailed {
        fields.push(quote! { detailed: true, });
    }
    let substrate = match config.substrate {
        SubstrateArg::None => Some(quote! { None }),
        SubstrateArg::Threads => None,
        SubstrateArg::Processes => Some(quote! { Processes }),
        SubstrateArg::Cooperative => Some(quote! { Cooperative }),
    };
    if let Some(variant) = substrate {
        fields.push(quote! { substrate: ::timeit::internal::Substrate::#variant, });
    }
    if let Some(level) = &config.log_level {
        fields.push(quote! { log_level: ::timeit::internal::LogLevel::#level, });
    }

    quote! {
        ::timeit::internal::TimeitConfig {
            #(#fields)*
            ..::timeit::internal::TimeitConfig::DEFAULT
        }
    }
}

fn parse_duration(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.starts_with('-') {
        return None;
    }
    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<f64>().ok().map(|v| v / 1e3)
    } else if let Some(us) = s.strip_suffix("us").or_else(|| s.strip_suffix("µs")) {
        us.trim().parse::<f64>().ok().map(|v| v / 1e6)
    } else if let Some(ns) = s.strip_suffix("ns") {
        ns.trim().parse::<f64>().ok().map(|v| v / 1e9)
    } else if let Some(m) = s.strip_suffix('m') {
        m.trim().parse::<f64>().ok().map(|v| v * 60.0)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<f64>().ok()
    } else {
        s.parse::<f64>().ok()
    }
}
