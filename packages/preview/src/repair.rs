use siteforge_filetree::{flatten_files, MountTree};
use tracing::info;

/// Canonical replacement for the malformed build-tool config the generator
/// is known to emit
pub const FIXED_VITE_CONFIG: &str = "import { defineConfig } from 'vite';
import react from '@vitejs/plugin-react';

export default defineConfig({
  plugins: [react()],
  optimizeDeps: {
    exclude: ['lucide-react'],
  },
});
";

/// The known-bad signature: an `exclude:` option cluster without the
/// `optimizeDeps` parent block it belongs inside
fn is_malformed(contents: &str) -> bool {
    contents.contains("exclude:") && !contents.contains("optimizeDeps: {")
}

/// Find a mounted vite config carrying the known-bad signature.
///
/// This is a targeted workaround for a class of generator defects, not
/// general config validation. Returns the path to overwrite, if any.
pub fn find_broken_vite_config(mounted: &MountTree) -> Option<String> {
    for (path, contents) in flatten_files(mounted) {
        if path.ends_with("vite.config.ts") && is_malformed(contents) {
            info!(path = %path, "found malformed vite config");
            return Some(path);
        }
    }
    None
}
