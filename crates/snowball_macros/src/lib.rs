use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, FnArg, ItemFn, Pat};

/// Time a system when the `perf_stats` feature is enabled.
///
/// The function body is wrapped in a guard that logs its duration on exit.
/// Without `perf_stats` the guard is not emitted at all.
///
/// If the system takes a `clock: Res<Clock>` parameter, the frame tick is
/// included in the log line and a sample is logged every 100 ticks even
/// when under the threshold.
///
/// ```ignore
/// #[profile(2)]
/// pub fn collision_update(clock: Res<Clock>, mut collisions: ResMut<CollisionSystem>) {
///     // ...
/// }
/// ```
#[proc_macro_attribute]
pub fn profile(attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemFn);

    let threshold_ms: u128 = if attr.is_empty() {
        1
    } else {
        attr.to_string().trim().parse().unwrap_or(1)
    };

    let attrs = &input.attrs;
    let vis = &input.vis;
    let sig = &input.sig;
    let block = &input.block;
    let fn_name_str = sig.ident.to_string();

    let has_clock_param = sig.inputs.iter().any(|arg| {
        let FnArg::Typed(pat_type) = arg else { return false };
        let Pat::Ident(pat_ident) = &*pat_type.pat else { return false };
        if pat_ident.ident != "clock" {
            return false;
        }
        let ty = &pat_type.ty;
        quote!(#ty).to_string().contains("Clock")
    });

    let profile_guard_def = if has_clock_param {
        quote! {
            struct ProfileGuard {
                name: &'static str,
                start: std::time::Instant,
                tick: u64,
            }
            impl Drop for ProfileGuard {
                fn drop(&mut self) {
                    let elapsed = self.start.elapsed();
                    if elapsed.as_millis() > #threshold_ms || self.tick % 100 == 0 {
                        bevy::prelude::info!("[PERF] {} @ tick {}: {:?}", self.name, self.tick, elapsed);
                    }
                }
            }
            ProfileGuard {
                name: #fn_name_str,
                start: std::time::Instant::now(),
                tick: clock.tick(),
            }
        }
    } else {
        quote! {
            struct ProfileGuard {
                name: &'static str,
                start: std::time::Instant,
            }
            impl Drop for ProfileGuard {
                fn drop(&mut self) {
                    let elapsed = self.start.elapsed();
                    if elapsed.as_millis() > #threshold_ms {
                        bevy::prelude::info!("[PERF] {}: {:?}", self.name, elapsed);
                    }
                }
            }
            ProfileGuard {
                name: #fn_name_str,
                start: std::time::Instant::now(),
            }
        }
    };

    let output = quote! {
        #(#attrs)*
        #vis #sig {
            #[cfg(feature = "perf_stats")]
            let _profile_timer = {
                #profile_guard_def
            };

            #block
        }
    };

    output.into()
}
